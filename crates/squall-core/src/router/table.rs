//! Compiled route tiers

use crate::request::Request;
use crate::response::StaticResponder;
use crate::storage::{
    DynamicMatch, DynamicResponderStorage, PerfectHashStaticStorage, StaticResponderStorage,
};

/// Tier a request was resolved in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    StaticSensitive,
    StaticInsensitive,
    DynamicSensitive,
    DynamicInsensitive,
}

pub(crate) enum Resolved<'a> {
    Static(&'a StaticResponder, Tier),
    Dynamic(DynamicMatch<'a>, Tier),
}

/// One level of routes: four tiers, then nested groups
#[derive(Debug, Clone)]
pub(crate) struct RouteTable {
    pub(crate) statics: PerfectHashStaticStorage,
    pub(crate) dynamic_sensitive: DynamicResponderStorage,
    pub(crate) dynamic_insensitive: DynamicResponderStorage,
    pub(crate) groups: Vec<GroupTable>,
}

impl RouteTable {
    pub(crate) fn new(statics: PerfectHashStaticStorage) -> Self {
        Self {
            statics,
            dynamic_sensitive: DynamicResponderStorage::new(true),
            dynamic_insensitive: DynamicResponderStorage::new(false),
            groups: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.statics.len()
            + self.dynamic_sensitive.len()
            + self.dynamic_insensitive.len()
            + self.groups.iter().map(|g| g.table.len()).sum::<usize>()
    }

    pub(crate) fn resolve<'a>(&'a self, request: &Request) -> Option<Resolved<'a>> {
        if let Some(responder) = self.statics.respond(request.start_line(), true) {
            return Some(Resolved::Static(responder, Tier::StaticSensitive));
        }
        if let Some(responder) = self.statics.respond(request.start_line_lowercased(), false) {
            return Some(Resolved::Static(responder, Tier::StaticInsensitive));
        }
        if let Some(found) = self.dynamic_sensitive.resolve(request) {
            return Some(Resolved::Dynamic(found, Tier::DynamicSensitive));
        }
        if let Some(found) = self.dynamic_insensitive.resolve(request) {
            return Some(Resolved::Dynamic(found, Tier::DynamicInsensitive));
        }
        self.groups
            .iter()
            .filter(|group| group.covers(request))
            .find_map(|group| group.table.resolve(request))
    }
}

/// Routes under a path prefix
#[derive(Debug, Clone)]
pub(crate) struct GroupTable {
    pub(crate) prefix: Vec<String>,
    pub(crate) table: RouteTable,
}

impl GroupTable {
    /// Whether the request path starts with the prefix segments
    fn covers(&self, request: &Request) -> bool {
        self.prefix.len() <= request.path_component_count()
            && self.prefix.iter().enumerate().all(|(i, literal)| {
                request
                    .path_component(i)
                    .is_some_and(|segment| segment.eq_ignore_ascii_case(literal.as_bytes()))
            })
    }
}
