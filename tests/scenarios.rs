//! End-to-end scenario tests (§8 S1, S2, S4, S5, S6) driving
//! [`tpcore::interpreter::Interpreter`] directly over an in-memory
//! channel, plus a couple of the "Universals" properties that span
//! more than one module. S3 (LINK round-trip) is not exercised here:
//! it requires a real dynamically loaded artifact, which this crate's
//! test suite has no way to produce without running the toolchain;
//! `do_link`'s commarea-size and link-stack bookkeeping are instead
//! covered by `task.rs`'s own unit tests and by inspection.

mod utils;

use tpcore::enqueue::Scope;
use tpcore::error::{Error, Resp};
use tpcore::field::Type;
use tpcore::interpreter::{Command, CommandEnvelope, Outcome};
use tpcore::pool::QueryResult;
use tpcore::protocol::ClientChannel;
use tpcore::task::TaskContext;
use utils::{field, Harness, Pipe, ScriptedConnection};

/// S1. SEND with MAP/MAPSET/FROM, then RETURN: the copybook JSON is
/// inlined and the channel carries the documented keyword/value lines.
#[test]
fn s1_send_then_return_emits_documented_dialogue() {
    let mut harness = Harness::new();
    harness.write_copybook("MS1", r#"prefix M1 {"a":1,"b":2} suffix"#);

    let mut task = TaskContext::new(1, "T1", "T001");
    let mut channel = ClientChannel::new(Pipe::new(Vec::new()));

    let mut from_backing = *b"HELLO   ";
    let from = field(&mut from_backing, Type::Alphanumeric, 0, 0);

    {
        let mut interp = harness.interpreter(&mut task, &mut channel, None);

        let send = CommandEnvelope::new(Command::Send {
            map: Some("M1".to_string()),
            mapset: Some("MS1".to_string()),
            from: Some(from),
        });
        let outcome = interp.run(send).unwrap();
        assert!(matches!(outcome, Outcome::Continue(resp) if resp == Resp::OK));

        let ret = CommandEnvelope::new(Command::Return);
        let outcome = interp.run(ret).unwrap();
        assert!(matches!(outcome, Outcome::Ended(resp) if resp == Resp::OK));
    }

    let written = channel.into_inner().written_str();
    assert!(written.starts_with("SEND\nMAP='M1'\nMAPSET='MS1'\nJSON={\"a\":1,\"b\":2}\nFROM=HELLO\n\n"));
    assert!(written.contains("RETURN\n\n"));
}

/// S2. RECEIVE with a bound length: only the requested byte count is
/// read into INTO, and the trailing resp pair is picked up.
#[test]
fn s2_receive_reads_bounded_length_and_resp_pair() {
    let mut harness = Harness::new();
    let mut task = TaskContext::new(2, "T2", "T001");
    let mut channel = ClientChannel::new(Pipe::new(b"HELLOWORLD0\n0\n".to_vec()));

    let mut into_backing = [0u8; 10];
    let into = field(&mut into_backing, Type::Alphanumeric, 0, 0);

    let mut interp = harness.interpreter(&mut task, &mut channel, None);
    let receive = CommandEnvelope::new(Command::Receive { into, max_length: 10 });
    let outcome = interp.run(receive).unwrap();
    assert!(matches!(outcome, Outcome::Continue(resp) if resp == Resp::OK));
    assert_eq!(&into_backing, b"HELLOWORLD");
}

/// S4. A `NOSUSPEND` `ENQ` conflict reports resp 55 through a bound
/// RESP field rather than abending; once the holder releases, a
/// retried `ENQ` succeeds with resp 0.
#[test]
fn s4_nosuspend_enq_conflict_reports_resp_55_then_succeeds_after_release() {
    let mut harness = Harness::new();
    harness.enqueue.enqueue("R1", 1, Scope::UnitOfWork, false).unwrap();

    let mut task_b = TaskContext::new(2, "T2", "T002");
    let mut channel = ClientChannel::new(Pipe::new(Vec::new()));

    let mut resp_backing = [0u8; 4];
    let mut resp2_backing = [0u8; 4];

    {
        let mut interp = harness.interpreter(&mut task_b, &mut channel, None);
        let mut envelope =
            CommandEnvelope::new(Command::Enq { resource: "R1".to_string(), nosuspend: true, scope: Scope::Task });
        envelope.resp_field = Some(field(&mut resp_backing, Type::BinaryBigEndian, 0, 0));
        envelope.resp2_field = Some(field(&mut resp2_backing, Type::BinaryBigEndian, 0, 0));
        let outcome = interp.run(envelope).unwrap();
        assert!(matches!(outcome, Outcome::Continue(resp) if resp == Resp::new(55, 0)));
        assert_eq!(i32::from_be_bytes(resp_backing), 55);
    }

    harness.enqueue.release_all(1, Scope::UnitOfWork);

    let mut interp = harness.interpreter(&mut task_b, &mut channel, None);
    let retry = CommandEnvelope::new(Command::Enq { resource: "R1".to_string(), nosuspend: true, scope: Scope::Task });
    let outcome = interp.run(retry).unwrap();
    assert!(matches!(outcome, Outcome::Continue(resp) if resp == Resp::OK));
}

/// S5. A zoned-decimal output field bound to a query returning
/// `"1234.5"` ends up holding the zero-filled digit run `"0123450"`.
#[test]
fn s5_sql_zoned_decimal_round_trip() {
    let mut harness = Harness::new();
    let mut task = TaskContext::new(3, "T3", "T001");
    let mut channel = ClientChannel::new(Pipe::new(Vec::new()));

    let mut conn = ScriptedConnection {
        scripted: vec![QueryResult { columns: vec!["QTY".into()], rows: vec![vec![Some("1234.5".into())]], rows_affected: 1 }],
    };

    let mut qty_backing = [0u8; 7];
    let qty = field(&mut qty_backing, Type::ZonedNumeric, 7, 2);

    let mut status_backing = [0u8; 124];
    let status_area = field(&mut status_backing, Type::Alphanumeric, 0, 0);

    let mut interp = harness.interpreter(&mut task, &mut channel, Some(&mut conn));
    let sql = CommandEnvelope::new(Command::Sql {
        text: "SELECT QTY FROM ITEMS WHERE ID = 1".to_string(),
        params: vec![],
        outputs: vec![qty],
        status_area: Some(status_area),
    });
    let outcome = interp.run(sql).unwrap();
    assert!(matches!(outcome, Outcome::Continue(resp) if resp == Resp::OK));
    assert_eq!(&qty_backing, b"0123450");
    assert_eq!(&status_backing[0..4], &0i32.to_be_bytes());
    assert_eq!(&status_backing[119..124], b"00000");
}

/// S6. A condition handler registered for resp 22's abend code
/// (`AEIV`) intercepts a zero-length `GETMAIN` instead of the client
/// seeing an `ABEND`/`ABCODE` pair.
#[test]
fn s6_registered_condition_handler_intercepts_abend() {
    let mut harness = Harness::new();
    let mut task = TaskContext::new(4, "T4", "T001");
    task.conditions.register_condition("AEIV", "BAD-GETMAIN-HANDLER");
    let mut channel = ClientChannel::new(Pipe::new(Vec::new()));

    let mut ptr_backing = [0u8; 8];
    let ptr_field = field(&mut ptr_backing, Type::BinaryNative, 0, 0);

    let mut interp = harness.interpreter(&mut task, &mut channel, None);
    let getmain = CommandEnvelope::new(Command::Getmain { ptr_field, length: 0, shared: false, init_byte: None });
    let outcome = interp.run(getmain).unwrap();
    assert!(matches!(outcome, Outcome::HandlerInvoked(label) if label == "BAD-GETMAIN-HANDLER"));

    assert!(!channel.into_inner().written_str().contains("ABEND"));
}

/// Universal 4: two tasks entering the same artifact name serialize —
/// the second `enter` cannot complete until the first `leave`.
#[test]
fn universal_module_serializer_serializes_same_name() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    let serializer = Arc::new(tpcore::serializer::ModuleSerializer::new());
    let concurrent = Arc::new(AtomicUsize::new(0));
    let max_concurrent = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let serializer = Arc::clone(&serializer);
        let concurrent = Arc::clone(&concurrent);
        let max_concurrent = Arc::clone(&max_concurrent);
        handles.push(thread::spawn(move || {
            serializer.enter("PROGX");
            let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            max_concurrent.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            concurrent.fetch_sub(1, Ordering::SeqCst);
            serializer.leave("PROGX");
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
}

/// Universal 6: a simulated fault deterministically produces exactly
/// one `ABEND`/`ABCODE`/`STOP` trio, and task-end cleanup (modeled
/// here by releasing the task's TASK-scope enqueue holds) still runs
/// for the faulted task.
#[test]
fn universal_simulated_fault_yields_abend_abcode_stop_trio() {
    let mut harness = Harness::new();
    let mut task = TaskContext::new(5, "T5", "T001");
    harness.enqueue.enqueue("HELD", 5, Scope::Task, false).unwrap();

    let _ = task.fault.simulate_fault();
    let mut channel = ClientChannel::new(Pipe::new(Vec::new()));

    {
        let mut interp = harness.interpreter(&mut task, &mut channel, None);
        let freemain = CommandEnvelope::new(Command::Freemain { ptr: std::ptr::null_mut() });
        let err = interp.run(freemain).unwrap_err();
        assert!(matches!(err, Error::TaskAbended(ref code) if code == "A47B"));
    }

    harness.enqueue.release_all(5, Scope::Task);
    assert!(harness.enqueue.enqueue("HELD", 6, Scope::Task, true).is_ok());

    let written = channel.into_inner().written_str();
    assert_eq!(written.matches("ABEND").count(), 1);
    assert_eq!(written.matches("ABCODE").count(), 1);
    assert_eq!(written.matches("STOP").count(), 1);
}
