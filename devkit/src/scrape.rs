/*!
Parser for the Prometheus text exposition format

Turns a `/metrics` body into samples that tests can query by metric name
and label set, with assertion helpers that produce readable failures.
*/

use anyhow::Result;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl Sample {
    /// True when the sample carries exactly this label set (order-insensitive)
    pub fn has_labels(&self, labels: &[(&str, &str)]) -> bool {
        self.labels.len() == labels.len()
            && labels
                .iter()
                .all(|(k, v)| self.labels.iter().any(|(name, value)| name == k && value == v))
    }
}

/// One parsed scrape
#[derive(Debug, Default)]
pub struct Scrape {
    samples: Vec<Sample>,
    types: HashMap<String, String>,
}

impl Scrape {
    /// Parse exposition text; malformed lines are skipped with a warning
    pub fn parse(text: &str) -> Self {
        let mut scrape = Scrape::default();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(rest) = line.strip_prefix("# TYPE ") {
                let mut parts = rest.split_whitespace();
                if let (Some(name), Some(kind)) = (parts.next(), parts.next()) {
                    scrape.types.insert(name.to_string(), kind.to_string());
                }
                continue;
            }
            if line.starts_with('#') {
                continue;
            }

            match parse_sample(line) {
                Some(sample) => scrape.samples.push(sample),
                None => log::warn!("⚠️ Skipping malformed exposition line: {}", line),
            }
        }

        scrape
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self, name: &str) -> Vec<&Sample> {
        self.samples.iter().filter(|s| s.name == name).collect()
    }

    /// Value of the sample with exactly this name and label set
    pub fn sample(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.samples
            .iter()
            .find(|s| s.name == name && s.has_labels(labels))
            .map(|s| s.value)
    }

    pub fn metric_type(&self, name: &str) -> Option<&str> {
        self.types.get(name).map(String::as_str)
    }

    /// Assert a sample exists with the expected value
    pub fn assert_sample(&self, name: &str, labels: &[(&str, &str)], expected: f64) -> Result<()> {
        match self.sample(name, labels) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => anyhow::bail!(
                "Sample {}{:?} mismatch: expected {}, got {}",
                name, labels, expected, actual
            ),
            None => anyhow::bail!("Sample {}{:?} not found", name, labels),
        }
    }

    /// Assert a sample is not exposed at all
    pub fn assert_absent(&self, name: &str, labels: &[(&str, &str)]) -> Result<()> {
        if let Some(actual) = self.sample(name, labels) {
            anyhow::bail!("Sample {}{:?} unexpectedly present with value {}", name, labels, actual);
        }
        Ok(())
    }
}

fn parse_sample(line: &str) -> Option<Sample> {
    let name_end = line.find(|c: char| c == '{' || c.is_whitespace())?;
    let name = line[..name_end].to_string();
    let mut rest = &line[name_end..];

    let mut labels = Vec::new();
    if rest.starts_with('{') {
        let (parsed, after) = parse_labels(&rest[1..])?;
        labels = parsed;
        rest = after;
    }

    // value, optionally followed by a timestamp
    let value = rest.split_whitespace().next()?.parse::<f64>().ok()?;
    Some(Sample { name, labels, value })
}

// Parses `k="v",k2="v2"}` and returns the labels plus the text after `}`
fn parse_labels(input: &str) -> Option<(Vec<(String, String)>, &str)> {
    let mut labels = Vec::new();
    let mut chars = input.char_indices().peekable();

    loop {
        while matches!(chars.peek(), Some((_, ' ')) | Some((_, ','))) {
            chars.next();
        }
        match chars.peek() {
            Some((idx, '}')) => return Some((labels, &input[idx + 1..])),
            None => return None,
            _ => {}
        }

        let mut key = String::new();
        for (_, c) in chars.by_ref() {
            if c == '=' {
                break;
            }
            key.push(c);
        }
        if chars.next().map(|(_, c)| c) != Some('"') {
            return None;
        }

        let mut value = String::new();
        loop {
            match chars.next()? {
                (_, '\\') => match chars.next()?.1 {
                    'n' => value.push('\n'),
                    other => value.push(other),
                },
                (_, '"') => break,
                (_, c) => value.push(c),
            }
        }

        labels.push((key.trim().to_string(), value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPOSITION: &str = r#"
# HELP network_latency_ms Network latency in milliseconds
# TYPE network_latency_ms gauge
network_latency_ms{target="8.8.8.8"} 11.2
network_latency_ms{target="github.com"} 0
# HELP port_status Port status
# TYPE port_status gauge
port_status{port="22",target="localhost"} 0
port_status{port="443",target="github.com"} 1
http_response_time_ms{url="http://httpbin.org/status/200"} 231.5 1700000000000
weird{note="a \"quoted\", value"} 3
"#;

    #[test]
    fn test_parse_samples() {
        let scrape = Scrape::parse(EXPOSITION);
        assert_eq!(scrape.len(), 6);
        assert_eq!(scrape.metric_type("port_status"), Some("gauge"));
        assert_eq!(scrape.samples("network_latency_ms").len(), 2);

        assert_eq!(scrape.sample("network_latency_ms", &[("target", "8.8.8.8")]), Some(11.2));
        assert_eq!(
            scrape.sample("port_status", &[("target", "localhost"), ("port", "22")]),
            Some(0.0)
        );
        assert_eq!(
            scrape.sample("http_response_time_ms", &[("url", "http://httpbin.org/status/200")]),
            Some(231.5)
        );
        assert_eq!(scrape.sample("weird", &[("note", "a \"quoted\", value")]), Some(3.0));
    }

    #[test]
    fn test_label_set_must_match_exactly() {
        let scrape = Scrape::parse(EXPOSITION);
        assert_eq!(scrape.sample("port_status", &[("target", "localhost")]), None);
        assert_eq!(scrape.sample("network_latency_ms", &[("target", "1.1.1.1")]), None);
    }

    #[test]
    fn test_assertions() {
        let scrape = Scrape::parse(EXPOSITION);
        scrape.assert_sample("port_status", &[("target", "github.com"), ("port", "443")], 1.0).unwrap();
        assert!(scrape.assert_sample("port_status", &[("target", "github.com"), ("port", "443")], 0.0).is_err());
        scrape.assert_absent("network_latency_ms", &[("target", "1.1.1.1")]).unwrap();
        assert!(scrape.assert_absent("network_latency_ms", &[("target", "github.com")]).is_err());
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let scrape = Scrape::parse("broken{target=\"x\" 1\nok 2\nnovalue\n");
        assert_eq!(scrape.len(), 1);
        assert_eq!(scrape.sample("ok", &[]), Some(2.0));
    }
}
