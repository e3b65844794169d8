use reqwest::Method;
use serde_json::Value;

/// Whether a request may be repeated without additional effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    /// Side-effect-free; eligible for transient-failure retries.
    Safe,
    /// State-changing; never retried.
    Unsafe,
}

impl Idempotency {
    /// Read methods are treated as side-effect-free.
    pub fn for_method(method: &Method) -> Self {
        if matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS) {
            Idempotency::Safe
        } else {
            Idempotency::Unsafe
        }
    }
}

/// Everything the transport client needs to (re)issue a call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the API base URL, or an absolute URL.
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Extra headers, applied before the correlation id and credential.
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub idempotency: Idempotency,
    /// Send without an Authorization header.
    pub skip_auth: bool,
    /// Retries already spent on this descriptor.
    pub attempt: u32,
    /// Set once the request has been replayed after a credential refresh.
    pub auth_replayed: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let idempotency = Idempotency::for_method(&method);
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            idempotency,
            skip_auth: false,
            attempt: 0,
            auth_replayed: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    /// Override the idempotency class derived from the method.
    pub fn idempotency(mut self, idempotency: Idempotency) -> Self {
        self.idempotency = idempotency;
        self
    }

    pub fn is_side_effect_free(&self) -> bool {
        self.idempotency == Idempotency::Safe
    }

    /// The path without query string or trailing slash, for endpoint matching.
    pub(crate) fn normalized_path(&self) -> &str {
        let path = self.path.split('?').next().unwrap_or("");
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            "/"
        } else {
            trimmed
        }
    }
}
