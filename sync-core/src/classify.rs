//! Request classification for the resource cache manager.
//!
//! Every intercepted request falls into exactly one [`ResourceClass`], which
//! selects the caching strategy and the region the response lives in. The
//! checks run in priority order with navigation first: a navigation request's
//! `Accept` header can also look JSON-like, so testing for API traffic first
//! would misroute page loads.

/// The resource classes the cache manager dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// An HTML page load.
    Navigation,
    /// Stylesheets, scripts and fonts under the static root.
    StaticAsset,
    /// Image resources, by file extension.
    Image,
    /// JSON/API traffic.
    Api,
    /// Everything unclassified.
    Other,
}

/// The request fields classification looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMeta {
    method: String,
    path: String,
    accept: Option<String>,
}

impl RequestMeta {
    /// Create request metadata from a method and URL path.
    ///
    /// Any query string on `path` is ignored for classification.
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.split('?').next().unwrap_or("").to_string(),
            accept: None,
        }
    }

    /// Attach an `Accept` header value.
    pub fn with_accept(mut self, accept: &str) -> Self {
        self.accept = Some(accept.to_string());
        self
    }

    /// The request method, uppercased.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The URL path, query stripped.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this request changes state at the server.
    ///
    /// Anything that is not a safe read is treated as mutating and goes
    /// through the network-then-queue interception path.
    pub fn is_mutating(&self) -> bool {
        !matches!(self.method.as_str(), "GET" | "HEAD" | "OPTIONS")
    }

    fn accept_contains(&self, needle: &str) -> bool {
        self.accept
            .as_deref()
            .map(|a| a.contains(needle))
            .unwrap_or(false)
    }
}

/// Classify a request into exactly one resource class.
pub fn classify(req: &RequestMeta) -> ResourceClass {
    if is_navigation(req) {
        ResourceClass::Navigation
    } else if is_static_asset(req.path()) {
        ResourceClass::StaticAsset
    } else if is_image(req.path()) {
        ResourceClass::Image
    } else if is_api(req) {
        ResourceClass::Api
    } else {
        ResourceClass::Other
    }
}

fn is_navigation(req: &RequestMeta) -> bool {
    req.method() == "GET" && req.accept_contains("text/html")
}

fn is_static_asset(path: &str) -> bool {
    path.starts_with("/static/")
        && (path.ends_with(".css")
            || path.ends_with(".js")
            || path.ends_with(".woff")
            || path.ends_with(".woff2"))
}

const IMAGE_EXTENSIONS: [&str; 6] = [".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp"];

fn is_image(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn is_api(req: &RequestMeta) -> bool {
    req.accept_contains("application/json") || req.path().starts_with("/api/")
}
