//! Example of a short session driven directly from Rust.

use std::rc::Rc;

use xplog_core::{
    CancelFlag, DataValue, OutputConfig, ScriptedInput, Session, SessionInfo, SystemClock,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Setup configuration
    let config = OutputConfig::default().with_base_dir("./xplog_demo");
    let info = SessionInfo::new(xplog_core::naming::program_identity());

    // 2. Open the data and event files for the next free subject number
    let mut session = Session::start_next_subject(info, config, Rc::new(SystemClock::new()))?;
    println!("Subject {}", session.info().subject_label());

    session.data().set_variable_names(["trial", "code", "rt"]);
    session.data().append_experiment_info("design: 2x2\nblocks: 1");

    // 3. Wait for triggers from a replayed device
    let mut trigger = session
        .trigger_matcher()
        .source(ScriptedInput::new([1, 3, 5, 2, 5]))
        .cancellation(CancelFlag::new())
        .build()?;

    for trial in 0..2 {
        match trigger.wait(Some(5), false) {
            Some(hit) => session.data().append_row([
                DataValue::from(trial),
                DataValue::from(hit.code),
                DataValue::from(hit.elapsed_ms as i64),
            ]),
            None => break,
        }
    }

    // 4. Late header amendment, merged on save without touching the rows
    session.data().append_subject_info("handedness = right");
    session.save()?;

    // 5. Release everything
    session.finish()?;
    Ok(())
}
