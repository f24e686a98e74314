use apm_core::{ApmError, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use super::payload::{ParentType, TracePayload, truncate_priority};

pub const VERSION: [u32; 2] = [0, 1];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyHeader {
    pub v: [u32; 2],
    pub d: LegacyData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sa: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ti: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tk: Option<String>,
}

impl LegacyHeader {
    pub fn from_payload(payload: &TracePayload) -> Self {
        // `tk` is only sent when it differs from the account id.
        let tk = payload
            .trusted_account_key
            .clone()
            .filter(|tk| *tk != payload.account_id);
        Self {
            v: VERSION,
            d: LegacyData {
                ty: Some(payload.parent_type.as_str().to_string()),
                ac: Some(payload.account_id.clone()),
                ap: Some(payload.app_id.clone()),
                id: payload.span_id.clone(),
                tx: payload.transaction_id.clone(),
                tr: payload.trace_id.clone(),
                pr: payload.priority.map(truncate_priority),
                sa: payload.sampled,
                ti: Some(payload.timestamp),
                tk,
            },
        }
    }

    pub fn decode(header: &str) -> Result<Self> {
        let raw = STANDARD
            .decode(header.trim())
            .map_err(|e| ApmError::Parse(format!("newrelic header base64: {e}")))?;
        serde_json::from_slice(&raw)
            .map_err(|e| ApmError::Parse(format!("newrelic header json: {e}")))
    }

    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| ApmError::Internal(format!("newrelic header json: {e}")))?;
        Ok(STANDARD.encode(json))
    }

    pub fn major_version(&self) -> u32 {
        self.v[0]
    }

    pub fn into_payload(self) -> Result<TracePayload> {
        let d = self.d;
        let missing = |field: &str| ApmError::Parse(format!("newrelic header missing {field}"));
        if d.id.is_none() && d.tx.is_none() {
            return Err(missing("id and tx"));
        }
        let parent_type = ParentType::from_name(d.ty.as_deref().ok_or_else(|| missing("ty"))?)?;
        Ok(TracePayload {
            version: (self.v[0], self.v[1]),
            parent_type,
            account_id: d.ac.ok_or_else(|| missing("ac"))?,
            app_id: d.ap.ok_or_else(|| missing("ap"))?,
            transaction_id: d.tx,
            span_id: d.id,
            trace_id: Some(d.tr.ok_or_else(|| missing("tr"))?),
            sampled: d.sa,
            priority: d.pr,
            timestamp: d.ti.ok_or_else(|| missing("ti"))?,
            trusted_account_key: d.tk,
        })
    }
}
