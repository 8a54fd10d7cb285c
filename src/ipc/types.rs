use std::sync::Arc;

use serde::Deserialize;

use crate::calc::MalformedPolicy;
use crate::ranking::RankingEngine;
use crate::store::GradeStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub store: Arc<GradeStore>,
    pub policy: MalformedPolicy,
}

impl AppState {
    pub fn engine(&self) -> RankingEngine<'_> {
        RankingEngine::new(&self.store, self.policy)
    }
}
