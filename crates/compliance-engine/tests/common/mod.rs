//! Scripted assessment service for pipeline tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use compliance_engine::{AssessmentError, AssessmentService, ComplianceEngine, KnowledgeBase};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub system: String,
    pub user: String,
    pub structured: bool,
}

/// Replays queued replies in order and records every call
#[derive(Default)]
pub struct ScriptedService {
    structured: Mutex<VecDeque<Result<Value, String>>>,
    text: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(self, region: Value) -> Self {
        self.structured.lock().unwrap().push_back(Ok(region));
        self
    }

    pub fn with_region_failure(self, message: &str) -> Self {
        self.structured
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn with_reply(self, reply: &str) -> Self {
        self.text.lock().unwrap().push_back(Ok(reply.to_string()));
        self
    }

    pub fn with_reply_failure(self, message: &str) -> Self {
        self.text.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, system: &str, user: &str, structured: bool) {
        self.calls.lock().unwrap().push(Call {
            system: system.to_string(),
            user: user.to_string(),
            structured,
        });
    }
}

#[async_trait]
impl AssessmentService for ScriptedService {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AssessmentError> {
        self.record(system, user, false);
        match self.text.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(AssessmentError::Status {
                status: 503,
                body: message,
            }),
            None => Err(AssessmentError::EmptyResponse),
        }
    }

    async fn complete_structured(
        &self,
        system: &str,
        user: &str,
        _schema: &Value,
    ) -> Result<Value, AssessmentError> {
        self.record(system, user, true);
        match self.structured.lock().unwrap().pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(AssessmentError::Decode(message)),
            None => Err(AssessmentError::EmptyResponse),
        }
    }
}

pub fn engine(service: Arc<ScriptedService>) -> ComplianceEngine {
    let knowledge = KnowledgeBase::embedded().expect("embedded knowledge");
    ComplianceEngine::new(Arc::new(knowledge), service)
}
