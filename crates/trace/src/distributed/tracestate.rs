use apm_core::{ApmError, Result};

use super::payload::{ParentType, TracePayload, format_priority};

pub const TENANT_SUFFIX: &str = "@nr";
pub const ENTRY_VERSION: u32 = 0;
pub const MAX_MEMBERS: usize = 32;
pub const MAX_BYTES: usize = 512;
const ENTRY_FIELDS: usize = 9;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceState {
    pub entry: Option<String>,
    pub vendors: Vec<String>,
}

impl TraceState {
    pub fn parse(header: &str, trust_key: &str) -> Self {
        let own_key = format!("{trust_key}{TENANT_SUFFIX}");
        let mut state = Self::default();
        for member in header.split(',').map(str::trim).filter(|m| !m.is_empty()) {
            let Some((key, value)) = member.split_once('=') else {
                continue;
            };
            if key.trim() == own_key && state.entry.is_none() {
                state.entry = Some(value.trim().to_string());
            } else {
                state.vendors.push(member.to_string());
            }
        }
        state
    }

    pub fn vendor_keys(&self) -> Vec<&str> {
        self.vendors
            .iter()
            .filter_map(|m| m.split_once('=').map(|(k, _)| k))
            .collect()
    }
}

pub fn parse_entry(value: &str, trust_key: &str) -> Result<TracePayload> {
    let fields: Vec<&str> = value.split('-').collect();
    if fields.len() < ENTRY_FIELDS {
        return Err(ApmError::Parse(format!(
            "tracestate entry has {} fields, expected {ENTRY_FIELDS}",
            fields.len()
        )));
    }
    let version: u32 = fields[0]
        .parse()
        .map_err(|_| ApmError::Parse(format!("tracestate version: {:?}", fields[0])))?;
    let parent_type = ParentType::from_code(fields[1])?;
    let account_id = required(fields[2], "account id")?;
    let app_id = required(fields[3], "app id")?;
    let sampled = match fields[6] {
        "1" => Some(true),
        "0" => Some(false),
        "" => None,
        other => return Err(ApmError::Parse(format!("tracestate sampled flag: {other}"))),
    };
    let priority = match fields[7] {
        "" => None,
        raw => Some(
            raw.parse::<f64>()
                .map_err(|_| ApmError::Parse(format!("tracestate priority: {raw}")))?,
        ),
    };
    let timestamp = fields[8]
        .parse::<u64>()
        .map_err(|_| ApmError::Parse(format!("tracestate timestamp: {:?}", fields[8])))?;

    Ok(TracePayload {
        version: (version, 0),
        parent_type,
        account_id,
        app_id,
        span_id: optional(fields[4]),
        transaction_id: optional(fields[5]),
        trace_id: None,
        sampled,
        priority,
        timestamp,
        trusted_account_key: Some(trust_key.to_string()),
    })
}

pub fn format_entry(trust_key: &str, payload: &TracePayload) -> String {
    let sampled = match payload.sampled {
        Some(true) => "1",
        Some(false) => "0",
        None => "",
    };
    let priority = payload.priority.map(format_priority).unwrap_or_default();
    format!(
        "{trust_key}{TENANT_SUFFIX}={ENTRY_VERSION}-{}-{}-{}-{}-{}-{sampled}-{priority}-{}",
        payload.parent_type.code(),
        payload.account_id,
        payload.app_id,
        payload.span_id.as_deref().unwrap_or_default(),
        payload.transaction_id.as_deref().unwrap_or_default(),
        payload.timestamp,
    )
}

pub fn format_header(entry: Option<&str>, vendors: &[String]) -> String {
    let mut members: Vec<&str> = Vec::with_capacity(vendors.len() + 1);
    let mut bytes = 0usize;
    if let Some(entry) = entry {
        members.push(entry);
        bytes = entry.len();
    }
    for vendor in vendors {
        let added = vendor.len() + usize::from(!members.is_empty());
        if members.len() >= MAX_MEMBERS || bytes + added > MAX_BYTES {
            break;
        }
        members.push(vendor);
        bytes += added;
    }
    members.join(",")
}

fn required(field: &str, what: &str) -> Result<String> {
    if field.is_empty() {
        return Err(ApmError::Parse(format!("tracestate entry is missing the {what}")));
    }
    Ok(field.to_string())
}

fn optional(field: &str) -> Option<String> {
    (!field.is_empty()).then(|| field.to_string())
}
