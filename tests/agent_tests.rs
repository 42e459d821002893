use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::Mutex;
use tokio::time::{sleep, timeout, Duration};

use autogents::{
    behaviour_fn, handler_fn, mailbox, Agent, AgentError, Behaviour, MailboxReceiver,
    MailboxSender, Message, TextMessage,
};

autogents::message_kind! {
    Alarm
}

struct Harness {
    agent: Agent,
    inbox: MailboxSender,
    outbox: MailboxReceiver,
}

fn harness(name: &str) -> Harness {
    let (inbox_tx, inbox_rx) = mailbox();
    let (outbox_tx, outbox_rx) = mailbox();
    Harness {
        agent: Agent::new(name, inbox_rx, outbox_tx),
        inbox: inbox_tx,
        outbox: outbox_rx,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn spawn_run(agent: &Agent) -> tokio::task::JoinHandle<autogents::Result<()>> {
    let agent = agent.clone();
    tokio::spawn(async move { agent.run().await })
}

fn counting_behaviour(
    counter: Arc<AtomicUsize>,
    pause: Duration,
) -> Arc<impl Behaviour> {
    Arc::new(behaviour_fn(move |_agent: Agent| {
        let counter = Arc::clone(&counter);
        async move {
            sleep(pause).await;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }))
}

#[tokio::test]
async fn emit_message_lands_on_outbox_unmodified() -> anyhow::Result<()> {
    let mut h = harness("Agent1");

    h.agent.emit_message(Alarm::new("test"))?;

    let received = h.outbox.recv().await.expect("message emitted");
    assert_eq!(received.content(), "test");
    assert_eq!(received.kind(), "Alarm");
    assert!(received.as_any().is::<Alarm>());
    Ok(())
}

#[tokio::test]
async fn emit_fails_once_outbox_receiver_is_gone() {
    let h = harness("Agent1");
    drop(h.outbox);

    let err = h.agent.emit_message(TextMessage::new("lost")).unwrap_err();
    assert!(matches!(err, AgentError::MailboxClosed { ref agent } if agent == "Agent1"));
}

#[tokio::test]
async fn registered_behaviour_runs_repeatedly() -> anyhow::Result<()> {
    let h = harness("Agent1");
    let counter = Arc::new(AtomicUsize::new(0));

    let id = h
        .agent
        .register_behaviour(counting_behaviour(Arc::clone(&counter), Duration::from_millis(10)))?;
    assert!(h.agent.is_behaviour_active(id));
    let task = spawn_run(&h.agent);

    wait_until(|| counter.load(Ordering::SeqCst) >= 3).await;

    assert!(h.agent.unregister_behaviour(id));
    assert!(!h.agent.is_behaviour_active(id));
    task.abort();
    let _ = task.await;
    Ok(())
}

#[tokio::test]
async fn behaviours_loop_without_run() -> anyhow::Result<()> {
    let h = harness("Agent1");
    let counter = Arc::new(AtomicUsize::new(0));

    h.agent
        .register_behaviour(counting_behaviour(Arc::clone(&counter), Duration::ZERO))?;

    wait_until(|| counter.load(Ordering::SeqCst) >= 10).await;
    Ok(())
}

#[tokio::test]
async fn unregistered_behaviour_stops_incrementing() -> anyhow::Result<()> {
    let h = harness("Agent1");
    let counter = Arc::new(AtomicUsize::new(0));

    let id = h
        .agent
        .register_behaviour(counting_behaviour(Arc::clone(&counter), Duration::from_millis(10)))?;
    wait_until(|| counter.load(Ordering::SeqCst) >= 2).await;

    assert!(h.agent.unregister_behaviour(id));
    let at_unregister = counter.load(Ordering::SeqCst);
    sleep(Duration::from_millis(100)).await;

    // at most the invocation already in flight may still land
    assert!(counter.load(Ordering::SeqCst) <= at_unregister + 1);
    assert_eq!(h.agent.behaviour_count(), 0);
    Ok(())
}

#[tokio::test]
async fn unregister_and_wait_confirms_the_loop_stopped() -> anyhow::Result<()> {
    let h = harness("Agent1");
    let counter = Arc::new(AtomicUsize::new(0));

    let id = h
        .agent
        .register_behaviour(counting_behaviour(Arc::clone(&counter), Duration::from_millis(10)))?;
    wait_until(|| counter.load(Ordering::SeqCst) >= 2).await;

    assert!(h.agent.unregister_behaviour_and_wait(id).await?);
    let stopped_at = counter.load(Ordering::SeqCst);
    sleep(Duration::from_millis(60)).await;
    assert_eq!(counter.load(Ordering::SeqCst), stopped_at);

    assert!(!h.agent.unregister_behaviour_and_wait(id).await?);
    Ok(())
}

#[tokio::test]
async fn unregistering_unknown_behaviour_is_a_no_op() -> anyhow::Result<()> {
    let h = harness("Agent1");
    let id = h
        .agent
        .register_behaviour(counting_behaviour(Arc::new(AtomicUsize::new(0)), Duration::from_millis(10)))?;

    assert!(h.agent.unregister_behaviour(id));
    assert!(!h.agent.unregister_behaviour(id));
    Ok(())
}

#[tokio::test]
async fn reregistering_a_behaviour_never_runs_two_loops() -> anyhow::Result<()> {
    struct Active(Arc<AtomicUsize>);
    impl Drop for Active {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    let h = harness("Agent1");
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));

    let behaviour = {
        let (active, peak, runs) = (Arc::clone(&active), Arc::clone(&peak), Arc::clone(&runs));
        Arc::new(behaviour_fn(move |_agent: Agent| {
            let (active, peak, runs) = (Arc::clone(&active), Arc::clone(&peak), Arc::clone(&runs));
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                let _guard = Active(active);
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(10)).await;
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
    };

    let first = h.agent.register_behaviour(Arc::clone(&behaviour))?;
    sleep(Duration::from_millis(15)).await;
    let second = h.agent.register_behaviour(Arc::clone(&behaviour))?;
    assert_eq!(first, second);
    assert_eq!(h.agent.behaviour_count(), 1);
    assert_eq!(h.agent.behaviour_id(&behaviour), Some(first));

    let before = runs.load(Ordering::SeqCst);
    wait_until(|| runs.load(Ordering::SeqCst) >= before + 3).await;
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn handler_receives_messages_put_on_inbox() -> anyhow::Result<()> {
    let h = harness("Agent1");
    let counter = Arc::new(AtomicUsize::new(0));

    let handler = {
        let counter = Arc::clone(&counter);
        Arc::new(handler_fn(move |_message: Arc<Alarm>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
    };
    h.agent.register_handler(handler);
    let task = spawn_run(&h.agent);

    h.inbox.send_message(Alarm::new("test")).expect("inbox open");
    wait_until(|| counter.load(Ordering::SeqCst) == 1).await;

    task.abort();
    let _ = task.await;
    Ok(())
}

#[tokio::test]
async fn unregistered_handler_misses_later_messages() -> anyhow::Result<()> {
    let h = harness("Agent1");
    let counted = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(AtomicUsize::new(0));

    let handler = {
        let counted = Arc::clone(&counted);
        Arc::new(handler_fn(move |_message: Arc<Alarm>| {
            let counted = Arc::clone(&counted);
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
    };
    let witness = {
        let seen = Arc::clone(&seen);
        Arc::new(handler_fn(move |_message: Arc<dyn Message>| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
    };
    let handler_id = h.agent.register_handler(handler);
    h.agent.register_handler(witness);

    h.inbox.send_message(Alarm::new("test1")).expect("inbox open");
    let consumer = {
        let agent = h.agent.clone();
        tokio::spawn(async move { agent.consume_messages().await })
    };
    wait_until(|| seen.load(Ordering::SeqCst) == 1).await;
    assert_eq!(counted.load(Ordering::SeqCst), 1);

    assert!(h.agent.unregister_handler(handler_id));
    assert!(!h.agent.unregister_handler(handler_id));
    h.inbox.send_message(Alarm::new("test2")).expect("inbox open");
    wait_until(|| seen.load(Ordering::SeqCst) == 2).await;
    assert_eq!(counted.load(Ordering::SeqCst), 1);

    consumer.abort();
    let _ = consumer.await;
    Ok(())
}

#[tokio::test]
async fn handler_registration_is_idempotent() -> anyhow::Result<()> {
    let h = harness("Agent1");
    let counter = Arc::new(AtomicUsize::new(0));
    let handler = {
        let counter = Arc::clone(&counter);
        Arc::new(handler_fn(move |_message: Arc<TextMessage>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
    };

    let first = h.agent.register_handler(Arc::clone(&handler));
    let second = h.agent.register_handler(Arc::clone(&handler));
    assert_eq!(first, second);
    assert_eq!(h.agent.handler_count(), 1);
    assert_eq!(h.agent.handler_id(&handler), Some(first));
    assert!(h.agent.is_handler_registered(first));

    let task = spawn_run(&h.agent);
    h.inbox.send_message(TextMessage::new("once")).expect("inbox open");
    wait_until(|| counter.load(Ordering::SeqCst) >= 1).await;
    sleep(Duration::from_millis(30)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    task.abort();
    let _ = task.await;
    Ok(())
}

#[tokio::test]
async fn handlers_only_see_their_declared_kind() -> anyhow::Result<()> {
    let h = harness("Agent1");
    let alarms = Arc::new(Mutex::new(Vec::new()));
    let everything = Arc::new(Mutex::new(Vec::new()));

    let alarm_handler = {
        let alarms = Arc::clone(&alarms);
        Arc::new(handler_fn(move |message: Arc<Alarm>| {
            let alarms = Arc::clone(&alarms);
            async move {
                alarms.lock().push(message.content().to_string());
                Ok(())
            }
        }))
    };
    let base_handler = {
        let everything = Arc::clone(&everything);
        Arc::new(handler_fn(move |message: Arc<dyn Message>| {
            let everything = Arc::clone(&everything);
            async move {
                everything.lock().push(format!("{}:{}", message.kind(), message));
                Ok(())
            }
        }))
    };
    h.agent.register_handler(alarm_handler);
    h.agent.register_handler(base_handler);

    let task = spawn_run(&h.agent);
    h.inbox.send_message(TextMessage::new("plain")).expect("inbox open");
    h.inbox.send_message(Alarm::new("ring")).expect("inbox open");
    wait_until(|| everything.lock().len() == 2).await;

    assert_eq!(*alarms.lock(), vec!["ring".to_string()]);
    assert_eq!(
        *everything.lock(),
        vec!["TextMessage:plain".to_string(), "Alarm:ring".to_string()]
    );

    task.abort();
    let _ = task.await;
    Ok(())
}

#[tokio::test]
async fn handlers_run_one_after_another_per_message() -> anyhow::Result<()> {
    let h = harness("Agent1");
    let log = Arc::new(Mutex::new(Vec::new()));

    for (name, pause) in [("slow", 20u64), ("fast", 0u64)] {
        let log = Arc::clone(&log);
        let handler = Arc::new(handler_fn(move |message: Arc<TextMessage>| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(format!("{name}:start:{}", message.content()));
                sleep(Duration::from_millis(pause)).await;
                log.lock().push(format!("{name}:end:{}", message.content()));
                Ok(())
            }
        }));
        h.agent.register_handler(handler);
    }

    let task = spawn_run(&h.agent);
    h.inbox.send_message(TextMessage::new("a")).expect("inbox open");
    h.inbox.send_message(TextMessage::new("b")).expect("inbox open");
    wait_until(|| log.lock().len() == 8).await;

    assert_eq!(
        *log.lock(),
        vec![
            "slow:start:a",
            "slow:end:a",
            "fast:start:a",
            "fast:end:a",
            "slow:start:b",
            "slow:end:b",
            "fast:start:b",
            "fast:end:b",
        ]
    );

    task.abort();
    let _ = task.await;
    Ok(())
}

#[tokio::test]
async fn run_fails_when_a_behaviour_fails() -> anyhow::Result<()> {
    let h = harness("Agent1");
    let sibling_runs = Arc::new(AtomicUsize::new(0));

    h.agent.register_behaviour(counting_behaviour(
        Arc::clone(&sibling_runs),
        Duration::from_millis(5),
    ))?;
    let failing = h.agent.register_behaviour(Arc::new(behaviour_fn(|_agent: Agent| async {
        sleep(Duration::from_millis(20)).await;
        Err(anyhow!("boom").into())
    })))?;

    let result = timeout(Duration::from_secs(2), h.agent.run()).await?;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("boom"));

    // the failed loop ended but stays registered; its sibling keeps going
    assert!(!h.agent.is_behaviour_active(failing));
    assert_eq!(h.agent.behaviour_count(), 2);
    let before = sibling_runs.load(Ordering::SeqCst);
    wait_until(|| sibling_runs.load(Ordering::SeqCst) > before).await;
    Ok(())
}

#[tokio::test]
async fn inbox_is_still_served_after_a_behaviour_failure() -> anyhow::Result<()> {
    let h = harness("Agent1");
    let handled = Arc::new(AtomicUsize::new(0));
    h.agent.register_handler({
        let handled = Arc::clone(&handled);
        Arc::new(handler_fn(move |_message: Arc<TextMessage>| {
            let handled = Arc::clone(&handled);
            async move {
                handled.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
    });
    h.agent.register_behaviour(Arc::new(behaviour_fn(|_agent: Agent| async {
        sleep(Duration::from_millis(20)).await;
        Err(anyhow!("boom").into())
    })))?;

    let result = timeout(Duration::from_secs(2), h.agent.run()).await?;
    assert!(result.unwrap_err().to_string().contains("boom"));

    h.inbox.send_message(TextMessage::new("after failure")).expect("inbox open");
    wait_until(|| handled.load(Ordering::SeqCst) == 1).await;

    // the next run picks the same consumption back up
    let task = spawn_run(&h.agent);
    h.inbox.send_message(TextMessage::new("resumed")).expect("inbox open");
    wait_until(|| handled.load(Ordering::SeqCst) == 2).await;
    assert!(!task.is_finished());

    task.abort();
    let _ = task.await;
    Ok(())
}

#[tokio::test]
async fn failure_without_active_run_is_reported_once() -> anyhow::Result<()> {
    let h = harness("Agent1");
    let failing = h.agent.register_behaviour(Arc::new(behaviour_fn(|_agent: Agent| async {
        Err(anyhow!("early").into())
    })))?;
    wait_until(|| !h.agent.is_behaviour_active(failing)).await;

    let result = timeout(Duration::from_secs(2), h.agent.run()).await?;
    assert_eq!(result.unwrap_err().to_string(), "early");

    let task = spawn_run(&h.agent);
    sleep(Duration::from_millis(30)).await;
    assert!(!task.is_finished());

    task.abort();
    let _ = task.await;
    Ok(())
}

#[tokio::test]
async fn never_suspending_behaviour_does_not_starve_siblings() -> anyhow::Result<()> {
    let h = harness("Agent1");
    let spins = Arc::new(AtomicUsize::new(0));
    let ticks = Arc::new(AtomicUsize::new(0));

    for counter in [Arc::clone(&spins), Arc::clone(&ticks)] {
        h.agent.register_behaviour(Arc::new(behaviour_fn(move |_agent: Agent| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })))?;
    }

    // single-threaded runtime: the test task itself only wakes if the loops yield
    wait_until(|| ticks.load(Ordering::SeqCst) >= 100).await;
    assert!(spins.load(Ordering::SeqCst) >= 100);
    Ok(())
}

#[tokio::test]
async fn run_fails_when_a_handler_fails() -> anyhow::Result<()> {
    let h = harness("Agent1");
    h.agent
        .register_handler(Arc::new(handler_fn(|message: Arc<TextMessage>| async move {
            Err(anyhow!("cannot handle {}", message).into())
        })));

    h.inbox.send_message(TextMessage::new("poison")).expect("inbox open");
    let result = timeout(Duration::from_secs(2), h.agent.run()).await?;

    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "cannot handle poison");
    Ok(())
}

#[tokio::test]
async fn run_ends_when_every_producer_is_gone() -> anyhow::Result<()> {
    let h = harness("Agent1");
    let Harness { agent, inbox, .. } = h;
    drop(inbox);

    timeout(Duration::from_secs(2), agent.run()).await??;
    Ok(())
}

#[tokio::test]
async fn inbox_has_a_single_consumer() -> anyhow::Result<()> {
    let h = harness("Agent1");
    let task = spawn_run(&h.agent);
    sleep(Duration::from_millis(20)).await;

    let err = h.agent.consume_messages().await.unwrap_err();
    assert!(matches!(err, AgentError::AlreadyConsuming(ref name) if name == "Agent1"));

    task.abort();
    let _ = task.await;
    // cancelling the run task releases the inbox once its consumer is torn down
    sleep(Duration::from_millis(10)).await;
    let retry = {
        let agent = h.agent.clone();
        tokio::spawn(async move { agent.consume_messages().await })
    };
    sleep(Duration::from_millis(20)).await;
    assert!(!retry.is_finished());
    retry.abort();
    Ok(())
}

#[test]
fn behaviour_registration_needs_a_runtime() {
    let (_inbox_tx, inbox_rx) = mailbox();
    let (outbox_tx, _outbox_rx) = mailbox();
    let agent = Agent::new("Agent1", inbox_rx, outbox_tx);

    let err = agent
        .register_behaviour(Arc::new(behaviour_fn(|_agent: Agent| async { Ok(()) })))
        .unwrap_err();
    assert!(matches!(err, AgentError::NoRuntime));
    assert_eq!(agent.behaviour_count(), 0);
}

#[tokio::test]
async fn dropping_the_agent_stops_its_behaviours() -> anyhow::Result<()> {
    let h = harness("Agent1");
    let counter = Arc::new(AtomicUsize::new(0));
    h.agent
        .register_behaviour(counting_behaviour(Arc::clone(&counter), Duration::from_millis(5)))?;
    wait_until(|| counter.load(Ordering::SeqCst) >= 1).await;

    drop(h);
    sleep(Duration::from_millis(30)).await;
    let after_drop = counter.load(Ordering::SeqCst);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(counter.load(Ordering::SeqCst), after_drop);
    Ok(())
}
