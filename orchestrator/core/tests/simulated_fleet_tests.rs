// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use fleet_core::domain::agent::AgentId;
use fleet_core::domain::bus::{job_return_tag, parse_job_return_tag, EventBus, JobReturn};
use fleet_core::domain::fleet_config::FleetConfigManifest;
use fleet_core::domain::job::{JobIdGenerator, JobRequest, Target, PING_FUNCTION};
use fleet_core::domain::transport::JobClient;
use fleet_core::infrastructure::{InMemoryEventBus, SimulatedFleet, TimestampJobIdGenerator};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const CONFIG: &str = r#"
apiVersion: fleet.dev/v1
kind: FleetConfig
metadata:
  name: integration
spec:
  fleet:
    - id: web-1
      ping_delay: 10ms
      job_duration: 1s
    - id: web-2
      responsive: false
    - id: db-1
      hangs: true
"#;

fn request(target: Target, fun: &str, jids: &TimestampJobIdGenerator) -> JobRequest {
    JobRequest {
        target,
        fun: fun.to_string(),
        arg: Vec::new(),
        jid: jids.next_jid(),
        gather_job_timeout: Duration::from_secs(10),
        metadata: HashMap::new(),
    }
}

fn fleet_from_config(bus: Arc<InMemoryEventBus>) -> SimulatedFleet {
    let config = FleetConfigManifest::from_yaml_str(CONFIG).unwrap();
    config.validate().unwrap();
    SimulatedFleet::new(config.spec.fleet, bus)
}

#[tokio::test(start_paused = true)]
async fn test_configured_fleet_answers_pings() {
    let bus = Arc::new(InMemoryEventBus::default());
    let fleet = fleet_from_config(bus.clone());
    let jids = TimestampJobIdGenerator::new();
    let mut listener = bus.listen();

    let ping = request(Target::expression("*", "glob"), PING_FUNCTION, &jids);
    let ack = fleet.run_job(ping.clone()).await.unwrap();
    assert_eq!(ack.minions.len(), 3);

    tokio::time::sleep(Duration::from_secs(1)).await;

    let mut answered = Vec::new();
    while let Ok(event) = listener.try_recv() {
        let (jid, agent) = parse_job_return_tag(&event.tag).unwrap();
        assert_eq!(jid, ping.jid);
        answered.push(agent);
    }
    // Hanging agents still answer pings; only the unresponsive one is silent
    assert_eq!(answered.len(), 2);
    assert!(!answered.contains(&AgentId::from("web-2")));
}

#[tokio::test(start_paused = true)]
async fn test_job_return_is_published_after_duration() {
    let bus = Arc::new(InMemoryEventBus::default());
    let fleet = fleet_from_config(bus.clone());
    let jids = TimestampJobIdGenerator::new();
    let mut listener = bus.listen();

    let agents = [AgentId::from("web-1"), AgentId::from("db-1")];
    let job = request(Target::list(agents), "pkg.install", &jids);
    fleet.run_job(job.clone()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(listener.try_recv().is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let event = listener.try_recv().unwrap();
    assert_eq!(event.tag, job_return_tag(&job.jid, &AgentId::from("web-1")));
    let ret: JobReturn = serde_json::from_value(event.data).unwrap();
    assert_eq!(ret.ret, json!({"fun": "pkg.install", "success": true}));

    // db-1 hangs and never returns
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(listener.try_recv().is_err());
}
