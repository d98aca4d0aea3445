/*!
# NetWatch DevKit - Stubs et Utilitaires pour Tests

Bibliothèque facilitant les tests des sondes NetWatch sans réseau externe:
- Stubs HTTP (statut fixe, délai configurable) et TCP (ouvert / fermé / bloqué)
- Parseur du format d'exposition Prometheus avec assertions
- Harness de test regroupant tous les stubs
*/

pub mod scrape;
pub mod stub_server;
pub mod test_utils;

pub use scrape::{Sample, Scrape};
pub use stub_server::{closed_port, RecordedRequest, StalledTcpListener, StubHttpServer, StubTcpListener};
pub use test_utils::TestHarness;
