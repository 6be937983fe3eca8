//! Converter pool with failover across remote endpoints.
//!
//! Conversion turns the decoded semantic manifest into the externally
//! consumed form via a remote procedure. The endpoint list is shuffled per
//! call to spread load; endpoints are tried in turn until one responds.
//! Communication failures move on to the next endpoint; the first actual
//! response ends the search whether it carries a result or a semantic error.

use crate::error::{RelayError, Result};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Seam between the pipeline and conversion. Production uses
/// [`ConverterPool`]; embedders without remote converters supply an
/// [`InProcessConverter`].
pub trait ManifestConverter: Send + Sync {
    /// Convert a decoded manifest for the named site.
    fn convert(&self, manifest: &str, urn: &str) -> Result<String>;
}

/// Request body sent to a converter endpoint.
#[derive(Debug, Serialize)]
pub struct ConvertRequest<'a> {
    pub manifest: &'a str,
    pub urn: &'a str,
}

/// Response structure returned by a converter endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct ConvertResponse {
    /// True when the converter rejected the manifest.
    #[serde(default)]
    pub err: bool,
    /// Error message, present when `err` is set.
    #[serde(default)]
    pub msg: Option<String>,
    /// The converted payload on success.
    #[serde(default)]
    pub ret: Option<String>,
}

/// Failure to obtain any response from one endpoint. Either way the pool
/// moves on to the next endpoint.
#[derive(Debug)]
pub enum CallError {
    /// Endpoint unreachable or errored at the transport level.
    Transport(String),
    /// Endpoint answered with something that does not match the expected
    /// response shape (old or incompatible converter).
    BadShape(String),
}

/// One RPC attempt against one endpoint. Separated out so failover logic is
/// testable without a network.
pub trait EndpointCaller: Send + Sync {
    fn call(
        &self,
        endpoint: &str,
        manifest: &str,
        urn: &str,
    ) -> std::result::Result<ConvertResponse, CallError>;
}

/// Blocking HTTP JSON caller used in production.
pub struct HttpCaller {
    client: reqwest::blocking::Client,
}

impl HttpCaller {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl EndpointCaller for HttpCaller {
    fn call(
        &self,
        endpoint: &str,
        manifest: &str,
        urn: &str,
    ) -> std::result::Result<ConvertResponse, CallError> {
        let response = self
            .client
            .post(endpoint.trim())
            .json(&ConvertRequest { manifest, urn })
            .send()
            .map_err(|e| CallError::Transport(e.to_string()))?;
        let body = response
            .text()
            .map_err(|e| CallError::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| CallError::BadShape(e.to_string()))
    }
}

/// Stateless failover caller over a configured endpoint list.
pub struct ConverterPool<C: EndpointCaller> {
    endpoints: Vec<String>,
    caller: C,
}

impl ConverterPool<HttpCaller> {
    /// Pool over HTTP endpoints with a bounded per-call timeout.
    pub fn new(endpoints: Vec<String>, timeout: Duration) -> Result<Self> {
        Ok(Self::with_caller(endpoints, HttpCaller::new(timeout)?))
    }
}

impl<C: EndpointCaller> ConverterPool<C> {
    pub fn with_caller(endpoints: Vec<String>, caller: C) -> Self {
        Self { endpoints, caller }
    }
}

impl<C: EndpointCaller> ManifestConverter for ConverterPool<C> {
    fn convert(&self, manifest: &str, urn: &str) -> Result<String> {
        let mut order = self.endpoints.clone();
        order.shuffle(&mut rand::thread_rng());

        for endpoint in &order {
            debug!(endpoint, "invoking converter");
            match self.caller.call(endpoint, manifest, urn) {
                Ok(response) => {
                    // First endpoint that responds ends the search. A
                    // semantic rejection is definitive, not retried
                    // elsewhere.
                    if response.err {
                        return Err(RelayError::ConverterRejected(
                            response.msg.unwrap_or_default(),
                        ));
                    }
                    return response.ret.ok_or_else(|| {
                        RelayError::ConverterResponse("response carries no payload".into())
                    });
                }
                Err(CallError::Transport(reason)) => {
                    error!(endpoint, reason, "converter unreachable, trying next");
                }
                Err(CallError::BadShape(reason)) => {
                    error!(endpoint, reason, "incompatible converter response, trying next");
                }
            }
        }

        Err(RelayError::ConvertersUnreachable(self.endpoints.join(",")))
    }
}

/// In-process fallback used when no remote endpoints are configured. Wraps a
/// conversion function supplied by the embedder.
pub struct InProcessConverter {
    func: Box<dyn Fn(&str, &str) -> Result<String> + Send + Sync>,
}

impl InProcessConverter {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            func: Box::new(func),
        }
    }
}

impl ManifestConverter for InProcessConverter {
    fn convert(&self, manifest: &str, urn: &str) -> Result<String> {
        (self.func)(manifest, urn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Caller scripted per endpoint; records the attempt order.
    struct Scripted {
        responses: Vec<(String, std::result::Result<ConvertResponse, &'static str>)>,
        attempts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(
            responses: Vec<(String, std::result::Result<ConvertResponse, &'static str>)>,
        ) -> Self {
            Self {
                responses,
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn attempt_count(&self) -> usize {
            self.attempts.lock().len()
        }
    }

    impl EndpointCaller for &Scripted {
        fn call(
            &self,
            endpoint: &str,
            _manifest: &str,
            _urn: &str,
        ) -> std::result::Result<ConvertResponse, CallError> {
            self.attempts.lock().push(endpoint.to_string());
            let (_, scripted) = self
                .responses
                .iter()
                .find(|(e, _)| e == endpoint)
                .expect("unscripted endpoint");
            match scripted {
                Ok(r) => Ok(r.clone()),
                Err(reason) => Err(CallError::Transport((*reason).to_string())),
            }
        }
    }

    fn ok(ret: &str) -> std::result::Result<ConvertResponse, &'static str> {
        Ok(ConvertResponse {
            err: false,
            msg: None,
            ret: Some(ret.to_string()),
        })
    }

    fn rejected(msg: &str) -> std::result::Result<ConvertResponse, &'static str> {
        Ok(ConvertResponse {
            err: true,
            msg: Some(msg.to_string()),
            ret: None,
        })
    }

    #[test]
    fn failover_stops_at_first_response() {
        let scripted = Scripted::new(vec![
            ("http://a".into(), Err("refused")),
            ("http://b".into(), Err("refused")),
            ("http://c".into(), ok("<rspec/>")),
        ]);
        let pool = ConverterPool::with_caller(
            vec!["http://a".into(), "http://b".into(), "http://c".into()],
            &scripted,
        );
        let out = pool.convert("<ndl/>", "web").unwrap();
        assert_eq!(out, "<rspec/>");
        // Shuffled order, but never more attempts than endpoints and the
        // successful endpoint is the last attempted.
        let attempts = scripted.attempts.lock().clone();
        assert!(attempts.len() <= 3);
        assert_eq!(attempts.last().unwrap(), "http://c");
    }

    #[test]
    fn all_unreachable_is_aggregate_error() {
        let scripted = Scripted::new(vec![
            ("http://a".into(), Err("refused")),
            ("http://b".into(), Err("refused")),
        ]);
        let pool =
            ConverterPool::with_caller(vec!["http://a".into(), "http://b".into()], &scripted);
        match pool.convert("<ndl/>", "web") {
            Err(RelayError::ConvertersUnreachable(list)) => {
                assert!(list.contains("http://a"));
                assert!(list.contains("http://b"));
            }
            other => panic!("expected ConvertersUnreachable, got {:?}", other.err()),
        }
        assert_eq!(scripted.attempt_count(), 2);
    }

    #[test]
    fn semantic_error_short_circuits() {
        // Single endpoint, rejects: no further attempts anywhere.
        let scripted = Scripted::new(vec![("http://a".into(), rejected("bad ndl"))]);
        let pool = ConverterPool::with_caller(vec!["http://a".into()], &scripted);
        match pool.convert("<ndl/>", "web") {
            Err(RelayError::ConverterRejected(msg)) => assert_eq!(msg, "bad ndl"),
            other => panic!("expected ConverterRejected, got {:?}", other.err()),
        }
        assert_eq!(scripted.attempt_count(), 1);
    }

    #[test]
    fn missing_payload_is_an_error() {
        let scripted = Scripted::new(vec![(
            "http://a".into(),
            Ok(ConvertResponse {
                err: false,
                msg: None,
                ret: None,
            }),
        )]);
        let pool = ConverterPool::with_caller(vec!["http://a".into()], &scripted);
        assert!(matches!(
            pool.convert("<ndl/>", "web"),
            Err(RelayError::ConverterResponse(_))
        ));
    }

    #[test]
    fn response_wire_shape_deserializes() {
        let r: ConvertResponse =
            serde_json::from_str(r#"{"err":false,"ret":"<rspec/>"}"#).unwrap();
        assert!(!r.err);
        assert_eq!(r.ret.as_deref(), Some("<rspec/>"));

        let r: ConvertResponse = serde_json::from_str(r#"{"err":true,"msg":"bad ndl"}"#).unwrap();
        assert!(r.err);
        assert_eq!(r.msg.as_deref(), Some("bad ndl"));
        assert!(r.ret.is_none());

        // Fields the converter does not send fall back to defaults.
        let r: ConvertResponse = serde_json::from_str("{}").unwrap();
        assert!(!r.err);

        assert!(serde_json::from_str::<ConvertResponse>("[1,2]").is_err());
    }

    #[test]
    fn in_process_converter_is_used_directly() {
        let conv = InProcessConverter::new(|m, urn| Ok(format!("converted:{urn}:{m}")));
        assert_eq!(
            conv.convert("<ndl/>", "web").unwrap(),
            "converted:web:<ndl/>"
        );
    }
}
