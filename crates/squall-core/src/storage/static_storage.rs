//! Static responder storage
//!
//! Static routes are keyed by their exact start line. Case-insensitive routes
//! are stored under the lower-cased start line and must be looked up with
//! the lower-cased request line.

use crate::error::RouterError;
use crate::http::{HttpVersion, Method};
use crate::response::{RouteTemplate, StaticResponder};
use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use squall_router::{KeyWidth, PerfectHashTable};
use tracing::debug;

/// Declared static route
#[derive(Debug, Clone)]
pub struct StaticRoute {
    pub method: Method,
    pub version: HttpVersion,
    /// Matched verbatim, no parameters
    pub path: String,
    pub case_sensitive: bool,
    pub template: RouteTemplate,
}

impl StaticRoute {
    pub fn new(method: Method, path: impl Into<String>, template: RouteTemplate) -> Self {
        Self {
            method,
            version: HttpVersion::Http11,
            path: path.into(),
            case_sensitive: true,
            template,
        }
    }

    pub fn get(path: impl Into<String>, template: RouteTemplate) -> Self {
        Self::new(Method::Get, path, template)
    }

    pub fn version(mut self, version: HttpVersion) -> Self {
        self.version = version;
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    /// `METHOD path VERSION`, lower-cased for case-insensitive routes
    pub fn start_line(&self) -> Vec<u8> {
        let line = format!("{} {} {}", self.method, self.path, self.version);
        if self.case_sensitive {
            line.into_bytes()
        } else {
            line.to_ascii_lowercase().into_bytes()
        }
    }

    pub fn validate(&self) -> Result<(), RouterError> {
        validate_literal_path(&self.path)
    }
}

/// Paths must be origin-form with no query, fragment or whitespace
pub(crate) fn validate_literal_path(path: &str) -> Result<(), RouterError> {
    let reason = if !path.starts_with('/') {
        Some("path must start with '/'")
    } else if path.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        Some("path contains whitespace or control characters")
    } else if path.contains(['?', '#']) {
        Some("path contains a query or fragment")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(RouterError::InvalidRoute {
            route: path.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Start-line keyed responder lookup with a case-sensitive and a
/// case-insensitive tier
pub trait StaticResponderStorage: Send + Sync {
    /// Store `responder`, returning the one it replaced
    fn register(
        &mut self,
        start_line: &[u8],
        case_sensitive: bool,
        responder: StaticResponder,
    ) -> Option<StaticResponder>;

    fn respond(&self, start_line: &[u8], case_sensitive: bool) -> Option<&StaticResponder>;

    /// Routes across both tiers
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, start_line: &[u8], case_sensitive: bool) -> bool {
        self.respond(start_line, case_sensitive).is_some()
    }
}

fn tier_key(start_line: &[u8], case_sensitive: bool) -> Box<[u8]> {
    if case_sensitive {
        start_line.into()
    } else {
        start_line.to_ascii_lowercase().into_boxed_slice()
    }
}

/// Two hash maps, one per tier
#[derive(Debug, Clone, Default)]
pub struct HashedStaticStorage {
    sensitive: FxHashMap<Box<[u8]>, StaticResponder>,
    insensitive: FxHashMap<Box<[u8]>, StaticResponder>,
}

impl HashedStaticStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries of one tier, in no particular order
    pub fn entries(&self, case_sensitive: bool) -> impl Iterator<Item = (&[u8], &StaticResponder)> {
        let tier = if case_sensitive {
            &self.sensitive
        } else {
            &self.insensitive
        };
        tier.iter().map(|(k, v)| (&k[..], v))
    }
}

impl StaticResponderStorage for HashedStaticStorage {
    fn register(
        &mut self,
        start_line: &[u8],
        case_sensitive: bool,
        responder: StaticResponder,
    ) -> Option<StaticResponder> {
        let key = tier_key(start_line, case_sensitive);
        if case_sensitive {
            self.sensitive.insert(key, responder)
        } else {
            self.insensitive.insert(key, responder)
        }
    }

    #[inline]
    fn respond(&self, start_line: &[u8], case_sensitive: bool) -> Option<&StaticResponder> {
        if case_sensitive {
            self.sensitive.get(start_line)
        } else {
            self.insensitive.get(start_line)
        }
    }

    fn len(&self) -> usize {
        self.sensitive.len() + self.insensitive.len()
    }
}

/// One tier: the keys in registration order, an index map over them, and a
/// perfect-hash table generated from the keys on first lookup after a change
#[derive(Debug, Clone)]
struct PerfectTier {
    name: &'static str,
    width: KeyWidth,
    minimal: bool,
    keys: Vec<Box<[u8]>>,
    responders: Vec<StaticResponder>,
    index: FxHashMap<Box<[u8]>, usize>,
    /// `Some(None)` when generation found no table and the index serves lookups
    table: OnceCell<Option<PerfectHashTable>>,
}

impl PerfectTier {
    fn new(name: &'static str, width: KeyWidth) -> Self {
        Self {
            name,
            width,
            minimal: false,
            keys: Vec::new(),
            responders: Vec::new(),
            index: FxHashMap::default(),
            table: OnceCell::new(),
        }
    }

    fn insert(&mut self, key: Box<[u8]>, responder: StaticResponder) -> Option<StaticResponder> {
        if let Some(&index) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.responders[index], responder));
        }
        self.index.insert(key.clone(), self.keys.len());
        self.keys.push(key);
        self.responders.push(responder);
        self.table.take();
        None
    }

    fn table(&self) -> Option<&PerfectHashTable> {
        self.table.get_or_init(|| self.generate()).as_ref()
    }

    fn generate(&self) -> Option<PerfectHashTable> {
        if self.keys.is_empty() {
            return None;
        }
        let tier = self.name;

        let names: Vec<String> = self
            .keys
            .iter()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .collect();
        let entries = names.iter().map(String::as_str).zip(self.keys.iter().map(|k| &k[..]));

        match PerfectHashTable::build(entries, self.width, self.minimal) {
            Ok(Some(table)) => {
                debug!(
                    tier,
                    routes = table.len(),
                    table_size = table.table_size(),
                    width_bytes = table.width().bytes(),
                    minimal = table.candidate().minimal,
                    load_factor = format_args!("{:.1}%", table.load_factor()),
                    "perfect hash generated"
                );
                Some(table)
            }
            Ok(None) => {
                debug!(tier, routes = self.keys.len(), "no perfect hash found, using map lookup");
                None
            }
            Err(err) => {
                debug!(tier, error = %err, "perfect hash generation rejected, using map lookup");
                None
            }
        }
    }

    #[inline]
    fn get(&self, start_line: &[u8]) -> Option<&StaticResponder> {
        let index = match self.table() {
            Some(table) => {
                let index = table.lookup_bytes(start_line)?;
                // Keys only sample a few bytes; confirm the whole line
                if *self.keys[index] != *start_line {
                    return None;
                }
                index
            }
            None => *self.index.get(start_line)?,
        };
        self.responders.get(index)
    }
}

/// Perfect-hash lookup per tier.
///
/// Registration only records the route. Each tier generates its table once,
/// on the first lookup after its key set changed.
#[derive(Debug, Clone)]
pub struct PerfectHashStaticStorage {
    sensitive: PerfectTier,
    insensitive: PerfectTier,
}

impl PerfectHashStaticStorage {
    pub const DEFAULT_WIDTH: KeyWidth = KeyWidth::B8;

    pub fn new() -> Self {
        Self::with_width(Self::DEFAULT_WIDTH)
    }

    /// Starting key width; generation widens it as needed
    pub fn with_width(width: KeyWidth) -> Self {
        Self {
            sensitive: PerfectTier::new("case-sensitive", width),
            insensitive: PerfectTier::new("case-insensitive", width),
        }
    }

    /// Prefer tables of exactly N slots
    pub fn minimal(mut self, minimal: bool) -> Self {
        for tier in [&mut self.sensitive, &mut self.insensitive] {
            if tier.minimal != minimal {
                tier.minimal = minimal;
                tier.table.take();
            }
        }
        self
    }

    /// Whether the tier is served by a perfect-hash table
    pub fn uses_perfect_hash(&self, case_sensitive: bool) -> bool {
        self.table(case_sensitive).is_some()
    }

    pub fn table(&self, case_sensitive: bool) -> Option<&PerfectHashTable> {
        self.tier(case_sensitive).table()
    }

    fn tier(&self, case_sensitive: bool) -> &PerfectTier {
        if case_sensitive {
            &self.sensitive
        } else {
            &self.insensitive
        }
    }

    fn tier_mut(&mut self, case_sensitive: bool) -> &mut PerfectTier {
        if case_sensitive {
            &mut self.sensitive
        } else {
            &mut self.insensitive
        }
    }
}

impl Default for PerfectHashStaticStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticResponderStorage for PerfectHashStaticStorage {
    fn register(
        &mut self,
        start_line: &[u8],
        case_sensitive: bool,
        responder: StaticResponder,
    ) -> Option<StaticResponder> {
        let key = tier_key(start_line, case_sensitive);
        self.tier_mut(case_sensitive).insert(key, responder)
    }

    #[inline]
    fn respond(&self, start_line: &[u8], case_sensitive: bool) -> Option<&StaticResponder> {
        self.tier(case_sensitive).get(start_line)
    }

    fn len(&self) -> usize {
        self.sensitive.keys.len() + self.insensitive.keys.len()
    }
}

/// Convert map storage into perfect-hash storage, generating both tables
/// up front
pub fn compile(storage: &HashedStaticStorage, width: KeyWidth, minimal: bool) -> PerfectHashStaticStorage {
    let mut compiled = PerfectHashStaticStorage::with_width(width).minimal(minimal);
    for case_sensitive in [true, false] {
        let mut entries: Vec<_> = storage.entries(case_sensitive).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        let tier = compiled.tier_mut(case_sensitive);
        for (key, responder) in entries {
            tier.insert(key.into(), responder.clone());
        }
        tier.table();
    }
    compiled
}
