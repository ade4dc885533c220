//! Security headers
//!
//! Baked into static route templates at build time, so they cost nothing per
//! request.

use super::{RouteFilter, StaticMiddleware};
use crate::http::{ContentType, HeaderName, HttpVersion, Method, StatusCode};
use crate::response::RouteTemplate;

/// Security configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    /// Content-Security-Policy
    pub csp: Option<String>,
    pub frame_options: FrameOptions,
    /// X-Content-Type-Options: nosniff
    pub content_type_options: bool,
    pub xss_protection: bool,
    pub hsts: Option<HstsConfig>,
    pub referrer_policy: Option<String>,
    pub permissions_policy: Option<String>,
    /// Cross-Origin-Opener-Policy
    pub coop: Option<String>,
    /// Cross-Origin-Embedder-Policy
    pub coep: Option<String>,
    /// Cross-Origin-Resource-Policy
    pub corp: Option<String>,
}

/// X-Frame-Options value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOptions {
    Deny,
    SameOrigin,
    None,
}

impl FrameOptions {
    pub fn as_header_value(&self) -> Option<&'static str> {
        match self {
            FrameOptions::Deny => Some("DENY"),
            FrameOptions::SameOrigin => Some("SAMEORIGIN"),
            FrameOptions::None => None,
        }
    }
}

/// HSTS configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HstsConfig {
    pub max_age: u64,
    pub include_subdomains: bool,
    pub preload: bool,
}

impl Default for HstsConfig {
    fn default() -> Self {
        Self {
            max_age: 31_536_000,
            include_subdomains: true,
            preload: false,
        }
    }
}

impl HstsConfig {
    pub fn as_header_value(&self) -> String {
        let mut value = format!("max-age={}", self.max_age);
        if self.include_subdomains {
            value.push_str("; includeSubDomains");
        }
        if self.preload {
            value.push_str("; preload");
        }
        value
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            csp: None,
            frame_options: FrameOptions::Deny,
            content_type_options: true,
            xss_protection: false,
            hsts: None,
            referrer_policy: Some("strict-origin-when-cross-origin".to_string()),
            permissions_policy: None,
            coop: None,
            coep: None,
            corp: None,
        }
    }
}

impl SecurityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strict preset for browser-facing sites
    pub fn strict() -> Self {
        Self {
            csp: Some("default-src 'self'; object-src 'none'; frame-ancestors 'none'".to_string()),
            frame_options: FrameOptions::Deny,
            content_type_options: true,
            xss_protection: false,
            hsts: Some(HstsConfig {
                preload: true,
                ..HstsConfig::default()
            }),
            referrer_policy: Some("strict-origin-when-cross-origin".to_string()),
            permissions_policy: Some("geolocation=(), microphone=(), camera=()".to_string()),
            coop: Some("same-origin".to_string()),
            coep: Some("require-corp".to_string()),
            corp: Some("same-origin".to_string()),
        }
    }

    /// API preset: no CSP or frame options
    pub fn api() -> Self {
        Self {
            csp: None,
            frame_options: FrameOptions::None,
            content_type_options: true,
            xss_protection: false,
            hsts: Some(HstsConfig::default()),
            referrer_policy: Some("no-referrer".to_string()),
            permissions_policy: None,
            coop: None,
            coep: None,
            corp: None,
        }
    }

    pub fn csp(mut self, policy: impl Into<String>) -> Self {
        self.csp = Some(policy.into());
        self
    }

    pub fn frame_options(mut self, options: FrameOptions) -> Self {
        self.frame_options = options;
        self
    }

    pub fn hsts(mut self, config: HstsConfig) -> Self {
        self.hsts = Some(config);
        self
    }

    pub fn no_hsts(mut self) -> Self {
        self.hsts = None;
        self
    }

    pub fn referrer_policy(mut self, policy: impl Into<String>) -> Self {
        self.referrer_policy = Some(policy.into());
        self
    }

    pub fn permissions_policy(mut self, policy: impl Into<String>) -> Self {
        self.permissions_policy = Some(policy.into());
        self
    }

    /// Header pairs this configuration produces
    pub fn headers(&self) -> Vec<(HeaderName, String)> {
        let mut headers = Vec::new();
        let mut push = |name: HeaderName, value: Option<String>| {
            if let Some(value) = value {
                headers.push((name, value));
            }
        };
        push(HeaderName::ContentSecurityPolicy, self.csp.clone());
        push(
            HeaderName::XFrameOptions,
            self.frame_options.as_header_value().map(str::to_string),
        );
        push(
            HeaderName::XContentTypeOptions,
            self.content_type_options.then(|| "nosniff".to_string()),
        );
        push(
            HeaderName::XXssProtection,
            self.xss_protection.then(|| "1; mode=block".to_string()),
        );
        push(
            HeaderName::StrictTransportSecurity,
            self.hsts.as_ref().map(HstsConfig::as_header_value),
        );
        push(HeaderName::ReferrerPolicy, self.referrer_policy.clone());
        push(HeaderName::PermissionsPolicy, self.permissions_policy.clone());
        push(HeaderName::CrossOriginOpenerPolicy, self.coop.clone());
        push(HeaderName::CrossOriginEmbedderPolicy, self.coep.clone());
        push(HeaderName::CrossOriginResourcePolicy, self.corp.clone());
        headers
    }
}

/// Static middleware setting the configured security headers
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, String)>,
    filter: RouteFilter,
}

impl SecurityHeaders {
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            headers: config.headers(),
            filter: RouteFilter::any(),
        }
    }

    pub fn strict() -> Self {
        Self::new(SecurityConfig::strict())
    }

    pub fn api() -> Self {
        Self::new(SecurityConfig::api())
    }

    /// Only touch routes matching `filter`
    pub fn with_filter(mut self, filter: RouteFilter) -> Self {
        self.filter = filter;
        self
    }
}

impl Default for SecurityHeaders {
    fn default() -> Self {
        Self::new(SecurityConfig::default())
    }
}

impl StaticMiddleware for SecurityHeaders {
    fn handles(
        &self,
        version: HttpVersion,
        method: Method,
        content_type: Option<&ContentType>,
        status: StatusCode,
    ) -> bool {
        self.filter.matches(version, method, content_type, status)
    }

    fn apply(&self, template: &mut RouteTemplate) {
        for (name, value) in &self.headers {
            template.head.set_header(name.clone(), value.clone());
        }
    }
}
