//! End-to-end offer matching scenarios (spec §8).

use std::collections::BTreeMap;
use std::sync::Arc;

use daq_scheduler_core::domain::descriptor::CommandRecipe;
use daq_scheduler_core::domain::offer::{Offer, ResourceBundle};
use daq_scheduler_core::domain::{Constraint, ResourceDemand, TaskDescriptor};
use daq_scheduler_core::offer_matcher::{deploy_notify_channel, pending_descriptors_channel, OfferMatcher};
use daq_scheduler_core::rm_client::memory::InMemoryTransport;
use daq_scheduler_core::rm_client::ResourceManagerClient;
use daq_scheduler_core::{TaskManager, TaskManagerState};
use daq_scheduler_shared::config::PortFloorsConfig;

fn offer(id: &str, agent_id: &str, attrs: &[(&str, &str)], cpus: f64, mem: u64, ports: Vec<std::ops::RangeInclusive<u32>>) -> Offer {
    let mut attributes = BTreeMap::new();
    for (k, v) in attrs {
        attributes.insert(k.to_string(), v.to_string());
    }
    Offer {
        id: id.to_string(),
        agent_id: agent_id.to_string(),
        hostname: format!("{agent_id}.local"),
        attributes,
        resources: ResourceBundle::new(cpus, mem, ports),
    }
}

fn readout_descriptor(constraints: Vec<Constraint>) -> TaskDescriptor {
    TaskDescriptor::new(
        "readout",
        "flp/0",
        ResourceDemand::new(2.0, 1024).with_dynamic_port("data"),
        CommandRecipe::new("/bin/readout"),
    )
    .with_constraints(constraints)
}

async fn setup() -> (Arc<TaskManagerState>, Arc<ResourceManagerClient>, Arc<InMemoryTransport>, OfferMatcher) {
    let mut manager = TaskManager::new();
    manager
        .class_demands_mut()
        .register("readout", ResourceDemand::new(2.0, 1024).with_dynamic_port("data"));
    let state = Arc::new(TaskManagerState::new(manager));
    let transport = Arc::new(InMemoryTransport::new());
    let rm_client = Arc::new(ResourceManagerClient::new(transport.clone()));
    let matcher = OfferMatcher::new(state.clone(), rm_client.clone(), PortFloorsConfig::default());
    (state, rm_client, transport, matcher)
}

#[tokio::test]
async fn single_offer_happy_path_launches_one_task() {
    let (_, _, transport, matcher) = setup().await;
    let (tx, mut rx) = pending_descriptors_channel();
    let (notifier, mut deploy_rx) = deploy_notify_channel();

    tx.push(vec![readout_descriptor(vec![])]);

    let offers = vec![offer(
        "offer-1",
        "agent-1",
        &[],
        4.0,
        8192,
        vec![10000..=11000, 47101..=47200],
    )];

    matcher.match_cycle(offers, &mut rx, &notifier).await;

    let accepts = transport.accepts();
    assert_eq!(accepts.len(), 1);
    assert_eq!(accepts[0].launches.len(), 1);
    assert!(transport.declines().is_empty());

    let deployed = deploy_rx.try_recv().expect("deploy notification expected");
    assert_eq!(deployed.len(), 1);
}

#[tokio::test]
async fn constraint_mismatch_declines_the_wrong_agent() {
    let (_, _, transport, matcher) = setup().await;
    let (tx, mut rx) = pending_descriptors_channel();
    let (notifier, _deploy_rx) = deploy_notify_channel();

    tx.push(vec![readout_descriptor(vec![Constraint::new("role", "FLP")])]);

    let offers = vec![
        offer("offer-a", "agent-a", &[("role", "FLP")], 4.0, 8192, vec![10000..=11000, 47101..=47200]),
        offer("offer-b", "agent-b", &[("role", "EPN")], 4.0, 8192, vec![10000..=11000, 47101..=47200]),
    ];

    matcher.match_cycle(offers, &mut rx, &notifier).await;

    let accepts = transport.accepts();
    assert_eq!(accepts.len(), 1);
    assert_eq!(accepts[0].offer_id, "offer-a");

    let declines = transport.declines();
    assert_eq!(declines.len(), 1);
    assert_eq!(declines[0], vec!["offer-b".to_string()]);
}

#[tokio::test]
async fn port_exhaustion_skips_descriptor_and_keeps_it_pending() {
    let (_, _, transport, matcher) = setup().await;
    let (tx, mut rx) = pending_descriptors_channel();
    let (notifier, _deploy_rx) = deploy_notify_channel();

    tx.push(vec![readout_descriptor(vec![])]);

    // Only one port available, below the control port floor: the mandatory
    // control port allocation fails before the named "data" port is even
    // attempted.
    let offers = vec![offer("offer-1", "agent-1", &[], 4.0, 8192, vec![10000..=10000])];

    matcher.match_cycle(offers, &mut rx, &notifier).await;

    assert!(transport.accepts().is_empty());
    let declines = transport.declines();
    assert_eq!(declines.len(), 1);
    assert_eq!(declines[0], vec!["offer-1".to_string()]);

    // Descriptor remains pending for the next cycle.
    let offers2 = vec![offer("offer-2", "agent-1", &[], 4.0, 8192, vec![10000..=11000, 47101..=47200])];
    matcher.match_cycle(offers2, &mut rx, &notifier).await;
    assert_eq!(transport.accepts().len(), 1);
}
