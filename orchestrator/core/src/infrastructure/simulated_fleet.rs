// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Simulated Fleet Transport
//!
//! An in-process [`JobClient`] that stands in for a real fleet. Each simulated
//! agent answers presence pings, runs dispatched jobs for a configured
//! duration, and answers liveness polls, all by publishing
//! `job/<jid>/return/<agent>` events on the shared [`EventBus`] after the
//! configured delays.
//!
//! Used by `fleet batch run` and by the integration tests.

use crate::domain::agent::AgentId;
use crate::domain::bus::{job_return_tag, EventBus};
use crate::domain::fleet_config::SimulatedAgentConfig;
use crate::domain::job::{JobAck, JobId, JobRequest, Target, FIND_JOB_FUNCTION, PING_FUNCTION};
use crate::domain::transport::{JobClient, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay before a simulated agent answers a liveness poll
const FIND_JOB_REPLY_DELAY: Duration = Duration::from_millis(50);

/// One submission as seen by the simulated transport.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRecord {
    pub fun: String,
    pub target: Target,
    pub jid: JobId,
    pub arg: Vec<serde_json::Value>,
}

#[derive(Default)]
struct FleetState {
    running: HashMap<AgentId, HashSet<JobId>>,
    dispatched: Vec<DispatchRecord>,
    failing: HashSet<String>,
}

#[derive(Clone)]
pub struct SimulatedFleet {
    agents: Arc<BTreeMap<AgentId, SimulatedAgentConfig>>,
    bus: Arc<dyn EventBus>,
    state: Arc<Mutex<FleetState>>,
}

impl SimulatedFleet {
    pub fn new(agents: Vec<SimulatedAgentConfig>, bus: Arc<dyn EventBus>) -> Self {
        let agents = agents
            .into_iter()
            .map(|agent| (AgentId::new(agent.id.clone()), agent))
            .collect();
        Self {
            agents: Arc::new(agents),
            bus,
            state: Arc::new(Mutex::new(FleetState::default())),
        }
    }

    /// Make every submission of `fun` fail at the transport layer.
    pub fn fail_function(&self, fun: impl Into<String>) {
        self.state.lock().failing.insert(fun.into());
    }

    /// Every submission accepted so far, in order.
    pub fn dispatched(&self) -> Vec<DispatchRecord> {
        self.state.lock().dispatched.clone()
    }

    /// Submissions of a given function.
    pub fn dispatched_for(&self, fun: &str) -> Vec<DispatchRecord> {
        self.state
            .lock()
            .dispatched
            .iter()
            .filter(|record| record.fun == fun)
            .cloned()
            .collect()
    }

    fn resolve(&self, target: &Target) -> Vec<AgentId> {
        match target {
            Target::Expression { tgt, tgt_type } => {
                if tgt_type != "glob" {
                    warn!(tgt_type = %tgt_type, "Simulated fleet only understands glob targets; matching by glob");
                }
                self.agents
                    .keys()
                    .filter(|id| glob_match(tgt, id.as_str()))
                    .cloned()
                    .collect()
            }
            Target::List { agents } => agents
                .iter()
                .filter(|id| self.agents.contains_key(*id))
                .cloned()
                .collect(),
        }
    }

    fn publish_later(&self, delay: Duration, jid: JobId, agent: AgentId, ret: serde_json::Value) {
        let bus = self.bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            bus.fire_event(&job_return_tag(&jid, &agent), json!({ "id": agent, "return": ret }));
        });
    }

    fn run_on_agent(&self, agent: &SimulatedAgentConfig, id: AgentId, request: &JobRequest) {
        if !agent.responsive {
            return;
        }
        match request.fun.as_str() {
            PING_FUNCTION => {
                self.publish_later(agent.ping_delay, request.jid.clone(), id, json!(true));
            }
            FIND_JOB_FUNCTION => {
                if agent.hangs {
                    return;
                }
                let polled = request
                    .arg
                    .first()
                    .and_then(|v| v.as_str())
                    .map(JobId::new);
                let running = polled.as_ref().is_some_and(|jid| {
                    self.state
                        .lock()
                        .running
                        .get(&id)
                        .is_some_and(|jobs| jobs.contains(jid))
                });
                let ret = match polled {
                    Some(jid) if running => json!({ "jid": jid, "fun": "running" }),
                    _ => json!({}),
                };
                self.publish_later(FIND_JOB_REPLY_DELAY, request.jid.clone(), id, ret);
            }
            fun => {
                if agent.hangs {
                    debug!(agent = %id, "Simulated agent accepted job and went silent");
                    return;
                }
                self.state
                    .lock()
                    .running
                    .entry(id.clone())
                    .or_default()
                    .insert(request.jid.clone());

                let bus = self.bus.clone();
                let state = self.state.clone();
                let jid = request.jid.clone();
                let fun = fun.to_string();
                let duration = agent.job_duration;
                tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    if let Some(jobs) = state.lock().running.get_mut(&id) {
                        jobs.remove(&jid);
                    }
                    bus.fire_event(
                        &job_return_tag(&jid, &id),
                        json!({ "id": id, "return": { "fun": fun, "success": true } }),
                    );
                });
            }
        }
    }
}

#[async_trait]
impl JobClient for SimulatedFleet {
    async fn run_job(&self, request: JobRequest) -> Result<JobAck, TransportError> {
        if self.state.lock().failing.contains(&request.fun) {
            return Err(TransportError::PublishFailed {
                jid: request.jid.to_string(),
                reason: format!("simulated failure for {}", request.fun),
            });
        }

        let matched = self.resolve(&request.target);
        debug!(jid = %request.jid, fun = %request.fun, matched = matched.len(), "Simulated dispatch");

        self.state.lock().dispatched.push(DispatchRecord {
            fun: request.fun.clone(),
            target: request.target.clone(),
            jid: request.jid.clone(),
            arg: request.arg.clone(),
        });

        for id in &matched {
            if let Some(agent) = self.agents.get(id) {
                self.run_on_agent(agent, id.clone(), &request);
            }
        }

        Ok(JobAck {
            jid: request.jid,
            minions: matched,
        })
    }
}

/// Shell-style glob supporting `*` and `?`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}
