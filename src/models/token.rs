use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::{null_as_default, Doctor, Patient};

pub type TokenId = i64;

/// A waiting-list entry, as served by `GET /api/queue/{doctorId}/waiting`.
///
/// `position` and `eta_seconds` are computed by the server and only mean
/// something while the token is waiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingToken {
    pub token_id: TokenId,
    pub token_number: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub patient_name: String,
    pub position: u32,
    #[serde(default)]
    pub eta_seconds: u64,
}

/// A full token record, as served by the enqueue, pending and completed endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: TokenId,
    pub token_number: u32,
    #[serde(default)]
    pub patient: Option<Patient>,
    #[serde(default)]
    pub doctor: Option<Doctor>,
    /// Set once the token is completed.
    #[serde(default)]
    pub service_seconds: Option<u64>,
    #[serde(default)]
    pub missed_count: Option<u32>,
}

impl Token {
    /// The patient's name, if the record carries a non-empty one.
    pub fn patient_name(&self) -> Option<&str> {
        self.patient
            .as_ref()
            .map(|p| p.name.as_str())
            .filter(|name| !name.is_empty())
    }
}

/// Which of a doctor's lists holds a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenList {
    Waiting,
    Pending,
    Completed,
}

/// The three lists of one doctor, pulled together and replaced together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub waiting: Vec<WaitingToken>,
    pub pending: Vec<Token>,
    pub completed: Vec<Token>,
}

impl QueueSnapshot {
    /// The list currently holding `token_id`, first match wins.
    pub fn membership(&self, token_id: TokenId) -> Option<TokenList> {
        if self.waiting.iter().any(|t| t.token_id == token_id) {
            Some(TokenList::Waiting)
        } else if self.pending.iter().any(|t| t.id == token_id) {
            Some(TokenList::Pending)
        } else if self.completed.iter().any(|t| t.id == token_id) {
            Some(TokenList::Completed)
        } else {
            None
        }
    }

    /// Token ids present in more than one list. Empty for a well-formed snapshot.
    pub fn overlaps(&self) -> Vec<TokenId> {
        let mut seen = HashSet::new();
        let mut dupes: Vec<TokenId> = self
            .waiting
            .iter()
            .map(|t| t.token_id)
            .chain(self.pending.iter().map(|t| t.id))
            .chain(self.completed.iter().map(|t| t.id))
            .filter(|id| !seen.insert(*id))
            .collect();
        dupes.sort_unstable();
        dupes.dedup();
        dupes
    }

    pub fn is_disjoint(&self) -> bool {
        self.overlaps().is_empty()
    }

    /// Highest token number across all three lists.
    pub fn max_token_number(&self) -> Option<u32> {
        self.waiting
            .iter()
            .map(|t| t.token_number)
            .chain(self.pending.iter().map(|t| t.token_number))
            .chain(self.completed.iter().map(|t| t.token_number))
            .max()
    }

    pub fn len(&self) -> usize {
        self.waiting.len() + self.pending.len() + self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
