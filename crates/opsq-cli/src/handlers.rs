//! Demo handlers for the four job types the ops pipeline runs.

use std::time::Duration;

use async_trait::async_trait;
use opsq_core::typed::{Handler, HandlerError, JobContext, JobPayload};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Serialize, Deserialize)]
pub struct Ingestion {
    pub source: String,
    pub rows: u32,
}

impl JobPayload for Ingestion {
    const TYPE: &'static str = "ingestion";
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Enrichment {
    pub record_id: u64,
}

impl JobPayload for Enrichment {
    const TYPE: &'static str = "enrichment";
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Escalation {
    pub case_id: u64,
    pub severity: String,
}

impl JobPayload for Escalation {
    const TYPE: &'static str = "escalation";
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SkipTrace {
    pub subject: String,
}

impl JobPayload for SkipTrace {
    const TYPE: &'static str = "skip_trace";
}

pub const JOB_TYPES: [&str; 4] = [
    Ingestion::TYPE,
    Enrichment::TYPE,
    Escalation::TYPE,
    SkipTrace::TYPE,
];

pub struct IngestionHandler;

#[async_trait]
impl Handler<Ingestion> for IngestionHandler {
    async fn handle(&self, payload: Ingestion, ctx: &JobContext) -> Result<(), HandlerError> {
        tokio::time::sleep(Duration::from_millis(u64::from(payload.rows.min(50)))).await;
        info!(job_id = %ctx.job_id, source = %payload.source, rows = payload.rows, "ingested");
        Ok(())
    }
}

/// Every `fail_every`-th record fails on its first attempt.
pub struct EnrichmentHandler {
    pub fail_every: u64,
}

#[async_trait]
impl Handler<Enrichment> for EnrichmentHandler {
    async fn handle(&self, payload: Enrichment, ctx: &JobContext) -> Result<(), HandlerError> {
        if self.fail_every > 0 && payload.record_id % self.fail_every == 0 && ctx.attempts == 1 {
            return Err(HandlerError::retry_after(
                format!("record {} not indexed yet", payload.record_id),
                1,
            ));
        }
        Ok(())
    }
}

pub struct EscalationHandler;

#[async_trait]
impl Handler<Escalation> for EscalationHandler {
    async fn handle(&self, payload: Escalation, ctx: &JobContext) -> Result<(), HandlerError> {
        info!(job_id = %ctx.job_id, case_id = payload.case_id, severity = %payload.severity, "escalated");
        Ok(())
    }
}

/// Unknown subjects never resolve, so they end up dead-lettered.
pub struct SkipTraceHandler;

#[async_trait]
impl Handler<SkipTrace> for SkipTraceHandler {
    async fn handle(&self, payload: SkipTrace, _ctx: &JobContext) -> Result<(), HandlerError> {
        if payload.subject == "unknown" {
            return Err(HandlerError::retry_after("subject could not be located", 0));
        }
        Ok(())
    }
}
