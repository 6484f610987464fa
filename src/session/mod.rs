//! Simulation session — the driver-facing wrapper around a [`StepEngine`].
//!
//! A session is built after the driver has completed the backend handshake
//! (it receives a ready `Arc<dyn NumericBackend>`; nothing here polls for
//! readiness).  It numbers ticks, timestamps each result, keeps a bounded
//! trajectory for the rendering layer, and tears the agent down on exit.
//!
//! Structural faults (`AgentError`) end the session: the caller is expected
//! to stop ticking and rebuild.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{StepEngine, StepResult};
use crate::backend::NumericBackend;
use crate::config::AgentConfig;
use crate::errors::AgentError;
use crate::monitor::VarianceReading;
use crate::predictor::EmotionPredictor;

/// One tick as recorded by the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub result: StepResult,
    pub variance: VarianceReading,
}

/// Aggregate view of a session so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ticks: u64,
    pub invalid_steps: u64,
    pub trust_score: f32,
    pub integration_param: f32,
    /// Mean trust over all ticks (1.0 before the first tick).
    pub mean_trust: f32,
}

/// A running simulation: one agent plus its recent history.
#[derive(Debug)]
pub struct Simulation {
    id: Uuid,
    started_at: DateTime<Utc>,
    engine: StepEngine,
    trajectory: VecDeque<StepRecord>,
    capacity: usize,
    ticks: u64,
    invalid_steps: u64,
    trust_sum: f64,
}

impl Simulation {
    /// Build the agent on an already-ready backend.
    pub fn start(
        config: AgentConfig,
        backend: Arc<dyn NumericBackend>,
        predictor: Box<dyn EmotionPredictor>,
    ) -> Result<Self, AgentError> {
        let capacity = config.trajectory_capacity;
        let engine = StepEngine::new(config, backend, predictor)?;
        let id = Uuid::new_v4();
        log::info!("Simulation {} started", id);

        Ok(Self {
            id,
            started_at: Utc::now(),
            engine,
            trajectory: VecDeque::with_capacity(capacity),
            capacity,
            ticks: 0,
            invalid_steps: 0,
            trust_sum: 0.0,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn engine(&self) -> &StepEngine {
        &self.engine
    }

    /// Run one step and record it.
    pub fn tick(
        &mut self,
        reward: f32,
        context: f32,
        observation: Option<&[f32]>,
    ) -> Result<StepRecord, AgentError> {
        let result = self
            .engine
            .step(reward, context, observation)
            .map_err(|e| {
                log::error!("Simulation {} stopped at tick {}: {}", self.id, self.ticks + 1, e);
                e
            })?;

        self.ticks += 1;
        if !result.valid {
            self.invalid_steps += 1;
        }
        self.trust_sum += result.trust_score as f64;

        let record = StepRecord {
            tick: self.ticks,
            timestamp: Utc::now(),
            result,
            variance: self.engine.variance(),
        };
        if self.trajectory.len() == self.capacity {
            self.trajectory.pop_front();
        }
        self.trajectory.push_back(record.clone());
        Ok(record)
    }

    /// Recorded ticks, oldest first.
    pub fn trajectory(&self) -> impl Iterator<Item = &StepRecord> {
        self.trajectory.iter()
    }

    /// Trajectory as a JSON array for the rendering layer.
    pub fn trajectory_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.trajectory)
    }

    pub fn summary(&self) -> SessionSummary {
        let mean_trust = if self.ticks == 0 {
            1.0
        } else {
            (self.trust_sum / self.ticks as f64) as f32
        };
        SessionSummary {
            session_id: self.id,
            started_at: self.started_at,
            ticks: self.ticks,
            invalid_steps: self.invalid_steps,
            trust_score: self.engine.trust_score(),
            integration_param: self.engine.integration_param(),
            mean_trust,
        }
    }

    /// Stop the session and release the agent's persistent state.
    pub fn teardown(self) -> SessionSummary {
        let summary = self.summary();
        log::info!(
            "Simulation {} finished: {} ticks, {} invalid",
            self.id,
            summary.ticks,
            summary.invalid_steps
        );
        self.engine.teardown();
        summary
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::BELIEF_DIM;
    use crate::backend::CpuBackend;
    use crate::predictor::{DensePredictor, FnPredictor};

    const WIDTH: usize = 6;
    const INPUT: usize = BELIEF_DIM + WIDTH + 2;

    fn start(backend: &Arc<CpuBackend>, config: AgentConfig) -> Simulation {
        Simulation::start(
            config,
            backend.clone(),
            Box::new(DensePredictor::seeded(INPUT, WIDTH, 3)),
        )
        .unwrap()
    }

    #[test]
    fn test_ticks_are_numbered_and_recorded() {
        let backend = CpuBackend::ready(None);
        let mut sim = start(&backend, AgentConfig::default());
        for i in 0..5 {
            let record = sim.tick(i as f32, 0.0, None).unwrap();
            assert_eq!(record.tick, i + 1);
        }
        let ticks: Vec<u64> = sim.trajectory().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![1, 2, 3, 4, 5]);
        assert_eq!(sim.summary().ticks, 5);
    }

    #[test]
    fn test_trajectory_is_bounded() {
        let backend = CpuBackend::ready(None);
        let config = AgentConfig {
            trajectory_capacity: 3,
            ..AgentConfig::default()
        };
        let mut sim = start(&backend, config);
        for _ in 0..10 {
            sim.tick(0.1, 1.0, None).unwrap();
        }
        let ticks: Vec<u64> = sim.trajectory().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![8, 9, 10]);
    }

    #[test]
    fn test_invalid_steps_are_counted() {
        let backend = CpuBackend::ready(None);
        let predictor = FnPredictor::new(INPUT, WIDTH, |input| {
            if input[INPUT - 2] < 0.0 {
                Ok(vec![f32::NAN; WIDTH])
            } else {
                Ok(vec![0.1; WIDTH])
            }
        });
        let mut sim =
            Simulation::start(AgentConfig::default(), backend.clone(), Box::new(predictor)).unwrap();

        sim.tick(1.0, 0.0, None).unwrap();
        assert!(!sim.tick(-1.0, 0.0, None).unwrap().result.valid);
        sim.tick(1.0, 0.0, None).unwrap();

        let summary = sim.summary();
        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.invalid_steps, 1);
        assert!(summary.mean_trust < 1.0);
    }

    #[test]
    fn test_teardown_releases_everything() {
        let backend = CpuBackend::ready(None);
        let before = backend.live_allocations();
        let mut sim = start(&backend, AgentConfig::default());
        for i in 0..20 {
            sim.tick((i as f32 * 0.3).cos(), (i % 4) as f32, Some(&[0.2; 10])).unwrap();
        }
        assert_eq!(backend.live_allocations(), before + 2);

        let summary = sim.teardown();
        assert_eq!(summary.ticks, 20);
        assert_eq!(backend.live_allocations(), before);
    }

    #[test]
    fn test_backend_fault_ends_session() {
        let backend = CpuBackend::ready(None);
        let mut sim = start(&backend, AgentConfig::default());
        sim.tick(0.0, 0.0, None).unwrap();

        backend.set_limit(Some(2));
        assert!(matches!(sim.tick(0.0, 0.0, None), Err(AgentError::Backend(_))));
        backend.set_limit(None);
        assert!(matches!(sim.tick(0.0, 0.0, None), Err(AgentError::EngineUnusable)));
        assert_eq!(sim.summary().ticks, 1);
    }

    #[test]
    fn test_trajectory_json_shape() {
        let backend = CpuBackend::ready(None);
        let mut sim = start(&backend, AgentConfig::default());
        sim.tick(0.5, 2.0, None).unwrap();

        let json: serde_json::Value = serde_json::from_str(&sim.trajectory_json().unwrap()).unwrap();
        let first = &json[0];
        assert_eq!(first["tick"], 1);
        assert!(first["emotion"].as_array().unwrap().len() == WIDTH);
        assert!(first.get("trustScore").is_some());
        assert!(first.get("integrationParam").is_some());
        assert_eq!(first["valid"], true);
        assert!(first["variance"].get("varianceLevel").is_some());
        assert!(first["variance"].get("highVariance").is_some());
    }

    #[test]
    fn test_empty_summary() {
        let backend = CpuBackend::ready(None);
        let sim = start(&backend, AgentConfig::default());
        let summary = sim.summary();
        assert_eq!(summary.ticks, 0);
        assert_eq!(summary.mean_trust, 1.0);
        assert_eq!(summary.session_id, sim.id());
    }
}
