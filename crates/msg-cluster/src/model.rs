//! Domain-level `Member`, decoupled from the generated proto types so the
//! rest of the workspace doesn't have to import `prost`-generated code.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::proto;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub label: String,
    pub version: String,
    pub service_addr: String,
    pub services: Vec<String>,
    pub dictionary: HashMap<String, u32>,
    pub is_master: bool,
}

impl From<proto::MemberInfo> for Member {
    fn from(m: proto::MemberInfo) -> Self {
        Member {
            label: m.label,
            version: m.version,
            service_addr: m.service_addr,
            services: m.services,
            dictionary: m.dictionary,
            is_master: m.is_master,
        }
    }
}

impl From<Member> for proto::MemberInfo {
    fn from(m: Member) -> Self {
        proto::MemberInfo {
            label: m.label,
            version: m.version,
            service_addr: m.service_addr,
            services: m.services,
            dictionary: m.dictionary,
            is_master: m.is_master,
        }
    }
}
