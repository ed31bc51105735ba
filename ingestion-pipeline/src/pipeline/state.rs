use state_machines::state_machine;

// Failures end the run by returning early; the observable `SessionState`
// records them, so the machine only models forward progress.
state_machine! {
    name: SessionMachine,
    state: SessionPhase,
    initial: Idle,
    states: [Idle, Uploading, Stored, Triggering, Polling, Ready],
    events {
        begin_upload { transition: { from: Idle, to: Uploading } }
        store { transition: { from: Uploading, to: Stored } }
        begin_trigger { transition: { from: Stored, to: Triggering } }
        begin_polling { transition: { from: Triggering, to: Polling } }
        confirm_ready { transition: { from: Polling, to: Ready } }
    }
}

pub fn idle() -> SessionMachine<(), Idle> {
    SessionMachine::new(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_walks_every_phase_in_order() {
        let Ok(machine) = idle().begin_upload() else {
            panic!("begin_upload rejected from Idle");
        };
        let Ok(machine) = machine.store() else {
            panic!("store rejected from Uploading");
        };
        let Ok(machine) = machine.begin_trigger() else {
            panic!("begin_trigger rejected from Stored");
        };
        let Ok(machine) = machine.begin_polling() else {
            panic!("begin_polling rejected from Triggering");
        };
        assert!(machine.confirm_ready().is_ok());
    }
}
