use std::time::Duration;

use log::{debug, info};
use reqwest::blocking::Client;

use super::traits::Sink;
use crate::{config::InfluxCfg, error::SinkError, sensors::Batch, threshold::IndicatorState};

/// Posts each batch to an InfluxDB v1 `/write` endpoint as line protocol.
#[derive(Debug, Clone)]
pub struct TelemetrySink {
    client: Client,
    url: String,
    database: String,
    user: String,
    password: String,
    host: String,
}

impl TelemetrySink {
    /// Builds the HTTP client; the machine hostname tags every line.
    pub fn new(cfg: &InfluxCfg) -> Result<Self, SinkError> {
        let host = gethostname::gethostname().to_string_lossy().into_owned();
        Self::with_host(cfg, host)
    }

    pub fn with_host(cfg: &InfluxCfg, host: impl Into<String>) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .map_err(|e| SinkError::Http(e.to_string()))?;

        Ok(Self {
            client,
            url: write_url(&cfg.server),
            database: cfg.database.clone(),
            user: cfg.user.clone(),
            password: cfg.password.clone(),
            host: host.into(),
        })
    }
}

fn write_url(server: &str) -> String {
    let server = server.trim_end_matches('/');
    if server.starts_with("http://") || server.starts_with("https://") {
        format!("{server}/write")
    } else {
        format!("http://{server}/write")
    }
}

/// One line per reading, newline-joined:
/// `<db>,host=<host>-<addr> temperature=<t>,humidity=<h> <timestamp>`
pub fn line_protocol(database: &str, host: &str, batch: &Batch) -> String {
    batch
        .iter()
        .map(|r| {
            format!(
                "{database},host={host}-{} temperature={:?},humidity={:?} {}",
                r.address, r.temperature, r.humidity, r.timestamp
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl Sink for TelemetrySink {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    fn publish(&mut self, batch: &Batch, _indicator: &IndicatorState) -> Result<(), SinkError> {
        if batch.is_empty() {
            debug!("Empty batch, nothing to post");
            return Ok(());
        }

        let body = line_protocol(&self.database, &self.host, batch);
        debug!("Influx query: {body}");

        let response = self
            .client
            .post(&self.url)
            .query(&[("precision", "s"), ("db", self.database.as_str())])
            .basic_auth(&self.user, Some(&self.password))
            .body(body)
            .send()
            .map_err(|e| SinkError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status(status.as_u16()));
        }

        info!("Wrote {} readings to {}", batch.len(), self.url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{Reading, SensorAddress};
    use pretty_assertions::assert_eq;
    use std::{
        io::{BufRead, BufReader, Read, Write},
        net::TcpListener,
        thread::{self, JoinHandle},
    };

    fn cfg(server: &str) -> InfluxCfg {
        InfluxCfg {
            enabled: true,
            server: server.to_string(),
            database: "storage".to_string(),
            user: "writer".to_string(),
            password: "secret".to_string(),
            timeout_seconds: 5,
        }
    }

    fn batch() -> Batch {
        [(1, 21.5, 40.25), (9, 19.0, 70.0)]
            .into_iter()
            .map(|(address, temperature, humidity)| Reading {
                timestamp: 1_560_000_000,
                address: SensorAddress::new(address).unwrap(),
                temperature,
                humidity,
            })
            .collect()
    }

    /// Serves a single request with `status_line` and returns the raw request head and body.
    fn one_shot_server(status_line: &'static str) -> (String, JoinHandle<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                if line == "\r\n" {
                    break;
                }
                head.push_str(&line);
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();

            let mut stream = stream;
            write!(
                stream,
                "{status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            )
            .unwrap();
            (head, String::from_utf8(body).unwrap())
        });
        (addr, handle)
    }

    #[test]
    fn line_protocol_format() {
        assert_eq!(
            line_protocol("storage", "pi", &batch()),
            "storage,host=pi-1 temperature=21.5,humidity=40.25 1560000000\n\
             storage,host=pi-9 temperature=19.0,humidity=70.0 1560000000"
        );
    }

    #[test]
    fn url_gets_scheme_only_when_missing() {
        assert_eq!(write_url("db.local:8086"), "http://db.local:8086/write");
        assert_eq!(write_url("https://db.local/"), "https://db.local/write");
    }

    #[test]
    fn posts_batch_with_query_and_basic_auth() {
        let (addr, server) = one_shot_server("HTTP/1.1 204 No Content");
        let mut sink = TelemetrySink::with_host(&cfg(&addr), "pi").unwrap();

        sink.publish(&batch(), &IndicatorState::zeroed(4)).unwrap();

        let (head, body) = server.join().unwrap();
        let request_line = head.lines().next().unwrap();
        assert!(request_line.starts_with("POST /write?"), "{request_line}");
        assert!(request_line.contains("precision=s"));
        assert!(request_line.contains("db=storage"));
        // base64("writer:secret")
        assert!(head.contains("d3JpdGVyOnNlY3JldA=="), "{head}");
        assert_eq!(body, line_protocol("storage", "pi", &batch()));
    }

    #[test]
    fn error_status_is_reported() {
        let (addr, server) = one_shot_server("HTTP/1.1 500 Internal Server Error");
        let mut sink = TelemetrySink::with_host(&cfg(&addr), "pi").unwrap();

        let err = sink.publish(&batch(), &IndicatorState::zeroed(4)).unwrap_err();
        server.join().unwrap();
        assert!(matches!(err, SinkError::Status(500)));
    }

    #[test]
    fn unreachable_server_is_an_http_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let mut sink = TelemetrySink::with_host(&cfg(&addr), "pi").unwrap();

        let err = sink.publish(&batch(), &IndicatorState::zeroed(4)).unwrap_err();
        assert!(matches!(err, SinkError::Http(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn empty_batch_posts_nothing() {
        // nothing listens on this address; publishing must not try
        let mut sink = TelemetrySink::with_host(&cfg("127.0.0.1:9"), "pi").unwrap();
        sink.publish(&Batch::new(), &IndicatorState::zeroed(4))
            .unwrap();
    }
}
