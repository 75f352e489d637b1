//! Ledger master resolution: channel + buyer state → ledger name.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::Channel;
use crate::core::states::state_abbreviation;
use crate::io::LedgerMasterRecord;

/// Suggested mapping attached to a ledger approval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSuggestion {
    pub channel: Channel,
    pub buyer_state: String,
    pub suggested_ledger_name: String,
}

/// Default suggestion for an unknown ledger, e.g. "Amazon HR".
pub fn suggest_ledger(channel: &Channel, buyer_state: &str) -> LedgerSuggestion {
    let state = buyer_state.trim().to_uppercase();
    LedgerSuggestion {
        channel: channel.clone(),
        buyer_state: state.clone(),
        suggested_ledger_name: format!(
            "{} {}",
            channel.title_case(),
            state_abbreviation(&state)
        ),
    }
}

/// Read-only snapshot of the ledger master.
pub struct LedgerResolver {
    by_key: HashMap<(String, String), LedgerMasterRecord>,
}

impl LedgerResolver {
    pub fn from_snapshot(records: Vec<LedgerMasterRecord>) -> Self {
        let by_key = records
            .into_iter()
            .map(|r| {
                (
                    (r.channel.as_str().to_string(), r.buyer_state.to_uppercase()),
                    r,
                )
            })
            .collect();
        Self { by_key }
    }

    pub fn resolve(&self, channel: &Channel, buyer_state: &str) -> Option<&LedgerMasterRecord> {
        self.by_key.get(&(
            channel.as_str().to_string(),
            buyer_state.trim().to_uppercase(),
        ))
    }
}
