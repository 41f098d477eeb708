use governance::*;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::io::Write;
use std::sync::Arc;
use treasury::{Treasury, TreasuryPool, TreasurySource};

const DAY: u64 = 86_400;
const WEEK: u64 = 7 * DAY;

struct Harness {
    engine: Governance,
    ledger: Arc<InMemoryStakeLedger>,
    pool: Arc<Mutex<TreasuryPool>>,
    parameters: Arc<InMemoryParameters>,
    registry: Arc<CapabilityRegistry>,
    events: Arc<MemoryEventSink>,
}

fn harness_with(config: GovernanceConfig) -> Harness {
    let ledger = Arc::new(InMemoryStakeLedger::new());
    let pool = Arc::new(Mutex::new(TreasuryPool::new()));
    let parameters = Arc::new(InMemoryParameters::with_known(&[("consensus", "block_time", 10)]));
    let registry = Arc::new(CapabilityRegistry::new());
    let events = Arc::new(MemoryEventSink::new());

    let engine = Governance::new(
        config,
        Collaborators {
            ledger: ledger.clone(),
            treasury: pool.clone(),
            parameters: parameters.clone(),
            authorizer: registry.clone(),
            events: events.clone(),
        },
    )
    .unwrap();

    Harness {
        engine,
        ledger,
        pool,
        parameters,
        registry,
        events,
    }
}

fn harness() -> Harness {
    harness_with(GovernanceConfig::default())
}

/// Ledger total of 100000 split over two holders
fn seed_hundred_thousand(h: &Harness) {
    h.ledger.set_stake("alice", 60_000).unwrap();
    h.ledger.set_stake("bob", 40_000).unwrap();
}

#[test]
fn test_basic_pass_executes_once() {
    let h = harness();
    seed_hundred_thousand(&h);

    let id = h
        .engine
        .submit("alice", "Adopt charter", ProposalCategory::General, ProposalPayload::None, None, 0)
        .unwrap();
    let proposal = h.engine.proposal(id).unwrap();
    assert_eq!(proposal.quorum_value(), 10_000);

    // 8000 + 5 for, 4000 + 5 against
    assert_eq!(h.engine.cast_vote(id, "whale", 64_000_000, 0, true, false, 0).unwrap(), 8_005);
    assert_eq!(h.engine.cast_vote(id, "orca", 16_000_000, 0, false, false, 0).unwrap(), 4_005);

    assert!(matches!(h.engine.execute(id, WEEK - 1), Err(GovernanceError::NotEnded)));

    let receipt = h.engine.execute(id, WEEK).unwrap();
    assert_eq!(receipt.action, ExecutedAction::None);
    assert!(matches!(
        h.engine.execute(id, WEEK + 1),
        Err(GovernanceError::AlreadyExecuted)
    ));
    assert_eq!(h.engine.status(id, WEEK + 1).unwrap(), ProposalStatus::Executed);

    let executed = h
        .events
        .events()
        .into_iter()
        .filter(|e| matches!(e, GovernanceEvent::ProposalExecuted { .. }))
        .count();
    assert_eq!(executed, 1);
}

#[test]
fn test_quorum_failure() {
    let h = harness();
    seed_hundred_thousand(&h);

    let id = h
        .engine
        .submit("alice", "Rename token", ProposalCategory::General, ProposalPayload::None, None, 0)
        .unwrap();
    // 495 + 5
    h.engine.cast_vote(id, "alice", 245_025, 0, true, false, 0).unwrap();

    let err = h.engine.execute(id, WEEK).unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::QuorumNotMet {
            cast: 500,
            required: 10_000
        }
    ));
    assert_eq!(h.engine.status(id, WEEK).unwrap(), ProposalStatus::QuorumFailed);
}

#[test]
fn test_critical_proposal_vetoed() {
    let h = harness();
    seed_hundred_thousand(&h);
    h.registry.grant("alice", Action::ChangeCriticalParameter);
    let token = h.registry.issue("alice", Action::ChangeCriticalParameter).unwrap();

    let id = h
        .engine
        .submit(
            "alice",
            "Halve block time",
            ProposalCategory::CriticalParameter,
            ProposalPayload::ParameterChange {
                target: "consensus".to_string(),
                name: "block_time".to_string(),
                value: 5,
            },
            Some(&token),
            0,
        )
        .unwrap();

    // 31622 + 5 and 10000 + 5 for: quorum of 33000 met
    h.engine.cast_vote(id, "alice", 1_000_000_000, 0, true, false, 0).unwrap();
    h.engine.cast_vote(id, "bob", 100_000_000, 0, true, false, 0).unwrap();
    // 10005 veto against a threshold of 10000
    h.engine.cast_vote(id, "carol", 100_000_000, 0, false, true, 0).unwrap();

    let proposal = h.engine.proposal(id).unwrap();
    assert!(proposal.votes_for > proposal.votes_against);
    assert_eq!(proposal.veto_votes, 10_005);

    assert!(matches!(
        h.engine.execute(id, WEEK),
        Err(GovernanceError::Vetoed {
            veto_votes: 10_005,
            threshold: 10_000
        })
    ));
    assert_eq!(h.parameters.get_parameter("consensus", "block_time"), Some(10));
}

#[test]
fn test_veto_rejected_outside_critical() {
    let h = harness();
    seed_hundred_thousand(&h);
    let id = h
        .engine
        .submit("alice", "x", ProposalCategory::General, ProposalPayload::None, None, 0)
        .unwrap();
    assert!(matches!(
        h.engine.vote(id, "bob", false, true, 1),
        Err(GovernanceError::VetoNotApplicable)
    ));
}

#[test]
fn test_parameter_change_applied() {
    let h = harness();
    // quorum 20% of 64 = 12; the vote weighs 8 + 5
    h.ledger.set_stake("alice", 64).unwrap();
    h.registry.grant("alice", Action::ChangeMinorParameter);
    let token = h.registry.issue("alice", Action::ChangeMinorParameter).unwrap();

    let id = h
        .engine
        .submit(
            "alice",
            "Faster blocks",
            ProposalCategory::MinorParameter,
            ProposalPayload::ParameterChange {
                target: "consensus".to_string(),
                name: "block_time".to_string(),
                value: 8,
            },
            Some(&token),
            0,
        )
        .unwrap();
    h.engine.vote(id, "alice", true, false, 0).unwrap();

    let receipt = h.engine.execute(id, WEEK).unwrap();
    assert_eq!(
        receipt.action,
        ExecutedAction::ParameterChange {
            target: "consensus".to_string(),
            name: "block_time".to_string(),
            value: 8,
        }
    );
    assert_eq!(h.parameters.get_parameter("consensus", "block_time"), Some(8));
}

#[test]
fn test_funding_withdraws_once() {
    let h = harness();
    h.ledger.set_stake("alice", 100).unwrap();
    h.ledger.set_stake("bob", 100).unwrap();
    h.pool
        .lock()
        .deposit(TreasurySource::ProtocolFees, 1_000, 0)
        .unwrap();

    let id = h
        .engine
        .submit(
            "alice",
            "Fund docs",
            ProposalCategory::Funding,
            ProposalPayload::Funding {
                amount: 500,
                recipient: "writer".to_string(),
            },
            None,
            0,
        )
        .unwrap();
    // quorum 15% of 200 = 30; each vote weighs 10 + 5
    h.engine.vote(id, "alice", true, false, 0).unwrap();
    h.engine.vote(id, "bob", true, false, 0).unwrap();

    let receipt = h.engine.execute(id, WEEK).unwrap();
    match receipt.action {
        ExecutedAction::Funding(withdrawal) => {
            assert_eq!(withdrawal.amount, 500);
            assert_eq!(withdrawal.recipient, "writer");
        }
        other => panic!("unexpected action {:?}", other),
    }

    assert!(h.engine.execute(id, WEEK + 1).is_err());
    assert_eq!(h.pool.balance(), 500);
    assert_eq!(h.pool.lock().transactions().len(), 2);
}

#[test]
fn test_failed_withdrawal_still_marks_executed() {
    let h = harness();
    h.ledger.set_stake("alice", 100).unwrap();

    let id = h
        .engine
        .submit(
            "alice",
            "Overdraw",
            ProposalCategory::Funding,
            ProposalPayload::Funding {
                amount: 1_000,
                recipient: "alice".to_string(),
            },
            None,
            0,
        )
        .unwrap();
    h.engine.vote(id, "alice", true, false, 0).unwrap();

    assert!(matches!(
        h.engine.execute(id, WEEK),
        Err(GovernanceError::ExecutionFailed { proposal_id, .. }) if proposal_id == id
    ));
    assert!(h.engine.proposal(id).unwrap().executed);
    assert!(matches!(
        h.engine.execute(id, WEEK + 1),
        Err(GovernanceError::AlreadyExecuted)
    ));
    assert!(h
        .events
        .events()
        .iter()
        .any(|e| matches!(e, GovernanceEvent::ExecutionFailed { .. })));
}

#[test]
fn test_unauthorized_parameter_proposal() {
    let h = harness();
    let payload = ProposalPayload::ParameterChange {
        target: "consensus".to_string(),
        name: "block_time".to_string(),
        value: 1,
    };

    assert!(matches!(
        h.engine.submit("mallory", "x", ProposalCategory::MinorParameter, payload.clone(), None, 0),
        Err(GovernanceError::Unauthorized(_))
    ));

    h.registry.grant("mallory", Action::ChangeMinorParameter);
    let token = h.registry.issue("mallory", Action::ChangeMinorParameter).unwrap();
    h.registry.revoke("mallory", Action::ChangeMinorParameter);
    assert!(matches!(
        h.engine.submit("mallory", "x", ProposalCategory::MinorParameter, payload, Some(&token), 0),
        Err(GovernanceError::Unauthorized(_))
    ));
    assert_eq!(h.engine.proposal_count(), 0);
}

#[test]
fn test_adaptive_quorum_converges_on_high_participation() {
    let h = harness();
    let holders: Vec<String> = (0..10).map(|i| format!("holder-{}", i)).collect();
    for holder in &holders {
        h.ledger.set_stake(holder, 100).unwrap();
    }

    for round in 0..10u64 {
        let start = round * 2 * WEEK;
        let id = h
            .engine
            .submit(&holders[0], "round", ProposalCategory::General, ProposalPayload::None, None, start)
            .unwrap();
        for holder in &holders[..6] {
            h.engine.vote(id, holder, true, false, start).unwrap();
        }
        h.engine.finalize(id, start + WEEK).unwrap();
    }

    assert_eq!(
        h.engine.participation_history(ProposalCategory::General),
        vec![6_000; 10]
    );
    // Nothing changes until the cache is refreshed
    assert_eq!(h.engine.current_quorum(ProposalCategory::General), 10);

    let quorum = h.engine.update_adaptive_quorum(ProposalCategory::General);
    assert!(quorum < 10 && quorum >= 8);
    assert_eq!(quorum, 9);

    let id = h
        .engine
        .submit(&holders[0], "after", ProposalCategory::General, ProposalPayload::None, None, 40 * WEEK)
        .unwrap();
    assert_eq!(h.engine.proposal(id).unwrap().quorum_percentage, 9);
    assert_eq!(h.engine.metrics().average_participation_bps(), 6_000);
}

#[test]
fn test_delegation_chain_votes_through_root() {
    let h = harness();
    h.ledger.set_stake("alice", 400).unwrap();
    h.ledger.set_stake("bob", 300).unwrap();
    h.ledger.set_stake("carol", 200).unwrap();

    h.engine.set_delegate("carol", "bob").unwrap();
    h.engine.set_delegate("bob", "alice").unwrap();
    assert_eq!(h.engine.voting_power("alice").unwrap(), 900);

    assert!(matches!(
        h.engine.set_delegate("alice", "carol"),
        Err(GovernanceError::CycleDetected { .. })
    ));

    let id = h
        .engine
        .submit("alice", "x", ProposalCategory::General, ProposalPayload::None, None, 0)
        .unwrap();
    // sqrt(900) + 5
    assert_eq!(h.engine.vote(id, "alice", true, false, 0).unwrap(), 35);

    let proposal = h.engine.proposal(id).unwrap();
    assert_eq!(proposal.participant_count(), 3);
    assert_eq!(proposal.ballot("alice").unwrap().stake, 900);
}

#[test]
fn test_concurrent_votes_are_all_counted() {
    let h = harness();
    h.ledger.set_stake("creator", 1_000_000).unwrap();
    let id = h
        .engine
        .submit("creator", "x", ProposalCategory::General, ProposalPayload::None, None, 0)
        .unwrap();

    (0..200u64).into_par_iter().for_each(|i| {
        // 10 + 5 each
        h.engine
            .cast_vote(id, &format!("voter-{}", i), 100, 0, i % 2 == 0, false, 0)
            .unwrap();
    });

    let proposal = h.engine.proposal(id).unwrap();
    assert_eq!(proposal.votes_for, 1_500);
    assert_eq!(proposal.votes_against, 1_500);
    assert_eq!(proposal.voter_count(), 200);
    assert_eq!(h.engine.metrics().unique_voters, 200);
}

#[test]
fn test_config_file_drives_engine() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
voting_period_secs = 3600
voting_delay_secs = 60

[base_quorum]
general = 25
"#
    )
    .unwrap();

    let config = GovernanceConfig::load(file.path()).unwrap();
    assert_eq!(config.base_quorum.funding, 15);

    let h = harness_with(config);
    let id = h
        .engine
        .submit("alice", "x", ProposalCategory::General, ProposalPayload::None, None, 1_000)
        .unwrap();
    let proposal = h.engine.proposal(id).unwrap();
    assert_eq!(proposal.quorum_percentage, 25);
    assert_eq!(proposal.start_time, 1_060);
    assert_eq!(proposal.end_time, 4_660);
    assert_eq!(h.engine.status(id, 1_000).unwrap(), ProposalStatus::Pending);
}

#[test]
fn test_invalid_config_rejected() {
    let config = GovernanceConfig {
        reputation_divisor: 0,
        ..GovernanceConfig::default()
    };
    let h = harness();
    let collaborators = Collaborators {
        ledger: h.ledger.clone(),
        treasury: h.pool.clone(),
        parameters: h.parameters.clone(),
        authorizer: h.registry.clone(),
        events: h.events.clone(),
    };
    assert!(matches!(
        Governance::new(config, collaborators),
        Err(GovernanceError::Config(ConfigError::Invalid(_)))
    ));
}

#[test]
fn test_proposals_by_status() {
    let h = harness();
    seed_hundred_thousand(&h);
    let early = h
        .engine
        .submit("alice", "early", ProposalCategory::General, ProposalPayload::None, None, 0)
        .unwrap();
    let late = h
        .engine
        .submit("bob", "late", ProposalCategory::General, ProposalPayload::None, None, 3 * DAY)
        .unwrap();

    let now = WEEK + DAY;
    let failed = h.engine.proposals_by_status(ProposalStatus::QuorumFailed, now);
    let active = h.engine.proposals_by_status(ProposalStatus::Active, now);
    assert_eq!(failed.iter().map(|p| p.id).collect::<Vec<_>>(), vec![early]);
    assert_eq!(active.iter().map(|p| p.id).collect::<Vec<_>>(), vec![late]);
}

#[test]
fn test_delegating_after_voting_does_not_block_delegatee() {
    let h = harness();
    h.ledger.set_stake("alice", 1_000_000).unwrap();
    h.ledger.set_stake("mallory", 1).unwrap();
    let id = h
        .engine
        .submit("alice", "x", ProposalCategory::General, ProposalPayload::None, None, 0)
        .unwrap();

    // 1 + 5
    assert_eq!(h.engine.vote(id, "mallory", false, false, 0).unwrap(), 6);
    h.engine.set_delegate("mallory", "alice").unwrap();

    // mallory's unit is already counted, so alice votes with her own stake
    assert_eq!(h.engine.vote(id, "alice", true, false, 0).unwrap(), 1_005);
    let proposal = h.engine.proposal(id).unwrap();
    let ballot = proposal.ballot("alice").unwrap();
    assert_eq!(ballot.stake, 1_000_000);
    assert_eq!(ballot.represented, vec!["alice".to_string()]);
    assert_eq!(proposal.votes_for, 1_005);
    assert_eq!(proposal.votes_against, 6);

    // Voting twice is still refused
    assert!(matches!(
        h.engine.vote(id, "alice", true, false, 1),
        Err(GovernanceError::AlreadyVoted(ref who)) if who == "alice"
    ));
}

#[test]
fn test_zero_stake_delegators_do_not_inflate_participation() {
    let h = harness();
    let holders: Vec<String> = (0..10).map(|i| format!("holder-{}", i)).collect();
    for holder in &holders {
        h.ledger.set_stake(holder, 100).unwrap();
    }

    for round in 0..5u64 {
        let start = round * 2 * WEEK;
        for sybil in 0..9 {
            h.engine
                .set_delegate(&format!("sybil-{}-{}", round, sybil), &holders[0])
                .unwrap();
        }
        let id = h
            .engine
            .submit(&holders[0], "round", ProposalCategory::General, ProposalPayload::None, None, start)
            .unwrap();
        h.engine.vote(id, &holders[0], true, false, start).unwrap();

        let proposal = h.engine.proposal(id).unwrap();
        assert_eq!(proposal.participant_count(), 1);
        assert_eq!(proposal.ballot(&holders[0]).unwrap().represented.len(), 1);
        h.engine.finalize(id, start + WEEK).unwrap();
    }

    assert_eq!(
        h.engine.participation_history(ProposalCategory::General),
        vec![1_000; 5]
    );
    // Low turnout raises the quorum instead of lowering it
    assert_eq!(h.engine.update_adaptive_quorum(ProposalCategory::General), 11);
}

#[test]
fn test_snapshot_keeps_adaptive_quorum_and_metrics() {
    let h = harness();
    let holders: Vec<String> = (0..10).map(|i| format!("holder-{}", i)).collect();
    for holder in &holders {
        h.ledger.set_stake(holder, 100).unwrap();
    }
    for round in 0..5u64 {
        let start = round * 2 * WEEK;
        let id = h
            .engine
            .submit(&holders[0], "round", ProposalCategory::General, ProposalPayload::None, None, start)
            .unwrap();
        for holder in &holders[..9] {
            h.engine.vote(id, holder, true, false, start).unwrap();
        }
        h.engine.finalize(id, start + WEEK).unwrap();
    }
    assert_eq!(h.engine.update_adaptive_quorum(ProposalCategory::General), 8);

    let json = serde_json::to_string(&h.engine.snapshot()).unwrap();
    let snapshot: GovernanceSnapshot = serde_json::from_str(&json).unwrap();
    let restored = Governance::restore(
        snapshot,
        GovernanceConfig::default(),
        Collaborators {
            ledger: h.ledger.clone(),
            treasury: h.pool.clone(),
            parameters: h.parameters.clone(),
            authorizer: h.registry.clone(),
            events: h.events.clone(),
        },
    )
    .unwrap();

    assert_eq!(restored.current_quorum(ProposalCategory::General), 8);
    assert_eq!(
        restored.participation_history(ProposalCategory::General),
        vec![9_000; 5]
    );
    assert_eq!(restored.metrics().unique_voters, 9);
    assert_eq!(restored.metrics(), h.engine.metrics());
    assert_eq!(restored.proposal_count(), 5);
}
