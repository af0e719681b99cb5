use crate::protocol::{Command, RenamePayload};
use crate::state::{ClientState, Counter};

pub const COUNTER_NOT_FOUND: &str = "Counter not found";
pub const COUNTER_BELOW_ZERO: &str = "Counter cannot go below zero";

/// Applies one command to a client's state and returns the next state.
/// Pure and total: no I/O, no suspension, every recognized command maps to
/// either a mutation or a rejection recorded in `state.error`. Unknown
/// commands never reach this function; they are rejected at the socket
/// boundary.
pub fn apply(mut state: ClientState, command: &Command) -> ClientState {
    match command {
        Command::AddCounter(name) => {
            state.counters.push(Counter {
                name: name.clone(),
                value: 0,
            });
        }
        Command::IncrementCounter(index) => match counter_at(&mut state.counters, *index) {
            Some(counter) => {
                counter.value += 1;
                state.error = None;
            }
            None => state.error = Some(COUNTER_NOT_FOUND.to_string()),
        },
        Command::DecrementCounter(index) => match counter_at(&mut state.counters, *index) {
            Some(counter) => {
                if counter.value > 0 {
                    counter.value -= 1;
                    state.error = None;
                } else {
                    // Rejected, not clamped: the value stays at zero and
                    // the rejection is surfaced through `error`.
                    state.error = Some(COUNTER_BELOW_ZERO.to_string());
                }
            }
            None => state.error = Some(COUNTER_NOT_FOUND.to_string()),
        },
        Command::ResetCounter(index) => match counter_at(&mut state.counters, *index) {
            Some(counter) => {
                counter.value = 0;
                state.error = None;
            }
            None => state.error = Some(COUNTER_NOT_FOUND.to_string()),
        },
        Command::RenameCounter(RenamePayload { index, new_name }) => {
            match counter_at(&mut state.counters, *index) {
                Some(counter) => {
                    counter.name = new_name.clone();
                    state.error = None;
                }
                None => state.error = Some(COUNTER_NOT_FOUND.to_string()),
            }
        }
        Command::RemoveCounter(index) => {
            // An out-of-range remove is a silent no-op: counters unchanged
            // and, unlike every other command, `error` untouched.
            if let Some(position) = valid_index(&state.counters, *index) {
                state.counters.remove(position);
                state.error = None;
            }
        }
    }
    state
}

fn counter_at(counters: &mut [Counter], index: i64) -> Option<&mut Counter> {
    usize::try_from(index).ok().and_then(|i| counters.get_mut(i))
}

fn valid_index(counters: &[Counter], index: i64) -> Option<usize> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < counters.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(name: &str, value: u64) -> Counter {
        Counter {
            name: name.to_string(),
            value,
        }
    }

    fn state_with(counters: Vec<Counter>, error: Option<&str>) -> ClientState {
        ClientState {
            counters,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn add_counter_appends_at_zero() {
        let state = apply(ClientState::default(), &Command::AddCounter("A".to_string()));
        assert_eq!(state.counters, vec![counter("A", 0)]);
        assert_eq!(state.error, None);
    }

    #[test]
    fn add_counter_allows_duplicate_names() {
        let state = apply(
            state_with(vec![counter("A", 3)], None),
            &Command::AddCounter("A".to_string()),
        );
        assert_eq!(state.counters, vec![counter("A", 3), counter("A", 0)]);
    }

    #[test]
    fn add_counter_leaves_a_prior_error_in_place() {
        let state = apply(
            state_with(vec![], Some(COUNTER_NOT_FOUND)),
            &Command::AddCounter("A".to_string()),
        );
        assert_eq!(state.error.as_deref(), Some(COUNTER_NOT_FOUND));
    }

    #[test]
    fn increment_bumps_value_and_clears_error() {
        let state = apply(
            state_with(vec![counter("A", 1)], Some(COUNTER_BELOW_ZERO)),
            &Command::IncrementCounter(0),
        );
        assert_eq!(state.counters, vec![counter("A", 2)]);
        assert_eq!(state.error, None);
    }

    #[test]
    fn increment_out_of_range_sets_not_found() {
        let initial = state_with(vec![counter("A", 1)], None);
        let state = apply(initial.clone(), &Command::IncrementCounter(1));
        assert_eq!(state.counters, initial.counters);
        assert_eq!(state.error.as_deref(), Some(COUNTER_NOT_FOUND));
    }

    #[test]
    fn negative_indexes_are_out_of_range() {
        let state = apply(
            state_with(vec![counter("A", 1)], None),
            &Command::IncrementCounter(-1),
        );
        assert_eq!(state.error.as_deref(), Some(COUNTER_NOT_FOUND));
        assert_eq!(state.counters, vec![counter("A", 1)]);
    }

    #[test]
    fn decrement_floors_at_zero_with_error() {
        let once = apply(
            state_with(vec![counter("A", 1)], None),
            &Command::DecrementCounter(0),
        );
        assert_eq!(once.counters, vec![counter("A", 0)]);
        assert_eq!(once.error, None);

        let twice = apply(once, &Command::DecrementCounter(0));
        assert_eq!(twice.counters, vec![counter("A", 0)]);
        assert_eq!(twice.error.as_deref(), Some(COUNTER_BELOW_ZERO));
    }

    #[test]
    fn decrement_out_of_range_sets_not_found() {
        let state = apply(
            state_with(vec![counter("A", 0)], None),
            &Command::DecrementCounter(7),
        );
        assert_eq!(state.counters, vec![counter("A", 0)]);
        assert_eq!(state.error.as_deref(), Some(COUNTER_NOT_FOUND));
    }

    #[test]
    fn reset_zeroes_value() {
        let state = apply(
            state_with(vec![counter("A", 9)], Some(COUNTER_NOT_FOUND)),
            &Command::ResetCounter(0),
        );
        assert_eq!(state.counters, vec![counter("A", 0)]);
        assert_eq!(state.error, None);
    }

    #[test]
    fn rename_changes_name_only() {
        let state = apply(
            state_with(vec![counter("A", 4)], None),
            &Command::RenameCounter(RenamePayload {
                index: 0,
                new_name: "B".to_string(),
            }),
        );
        assert_eq!(state.counters, vec![counter("B", 4)]);
        assert_eq!(state.error, None);
    }

    #[test]
    fn rename_out_of_range_leaves_state_and_sets_error() {
        let initial = state_with(vec![counter("A", 4)], None);
        let state = apply(
            initial.clone(),
            &Command::RenameCounter(RenamePayload {
                index: 2,
                new_name: "B".to_string(),
            }),
        );
        assert_eq!(state.counters, initial.counters);
        assert_eq!(state.error.as_deref(), Some(COUNTER_NOT_FOUND));
    }

    #[test]
    fn remove_shifts_subsequent_indexes_down() {
        let state = apply(
            state_with(vec![counter("A", 1), counter("B", 2), counter("C", 3)], None),
            &Command::RemoveCounter(1),
        );
        assert_eq!(state.counters, vec![counter("A", 1), counter("C", 3)]);
        assert_eq!(state.error, None);
    }

    #[test]
    fn remove_out_of_range_touches_nothing_including_error() {
        let initial = state_with(vec![counter("A", 1)], Some(COUNTER_BELOW_ZERO));
        let state = apply(initial.clone(), &Command::RemoveCounter(5));
        assert_eq!(state, initial);

        let state = apply(initial.clone(), &Command::RemoveCounter(-2));
        assert_eq!(state, initial);
    }

    #[test]
    fn counter_count_never_exceeds_adds_minus_valid_removes() {
        let commands = vec![
            Command::AddCounter("A".to_string()),
            Command::AddCounter("B".to_string()),
            Command::RemoveCounter(0),
            Command::RemoveCounter(9), // invalid, removes nothing
            Command::AddCounter("C".to_string()),
            Command::IncrementCounter(0),
        ];
        let mut state = ClientState::default();
        let mut adds = 0;
        let mut valid_removes = 0;
        for command in &commands {
            match command {
                Command::AddCounter(_) => adds += 1,
                Command::RemoveCounter(index) => {
                    if valid_index(&state.counters, *index).is_some() {
                        valid_removes += 1;
                    }
                }
                _ => {}
            }
            state = apply(state, command);
            assert!(state.counters.len() <= adds - valid_removes);
        }
        assert_eq!(state.counters.len(), 2);
    }

    // The canonical end-to-end sequence: add, increment, decrement to the
    // floor, invalid remove, rename.
    #[test]
    fn command_sequence_walkthrough() {
        let state = apply(ClientState::default(), &Command::AddCounter("A".to_string()));
        assert_eq!(state, state_with(vec![counter("A", 0)], None));

        let state = apply(state, &Command::IncrementCounter(0));
        assert_eq!(state, state_with(vec![counter("A", 1)], None));

        let state = apply(state, &Command::DecrementCounter(0));
        assert_eq!(state, state_with(vec![counter("A", 0)], None));

        let state = apply(state, &Command::DecrementCounter(0));
        assert_eq!(
            state,
            state_with(vec![counter("A", 0)], Some(COUNTER_BELOW_ZERO))
        );

        let state = apply(state, &Command::RemoveCounter(5));
        assert_eq!(
            state,
            state_with(vec![counter("A", 0)], Some(COUNTER_BELOW_ZERO))
        );

        let state = apply(
            state,
            &Command::RenameCounter(RenamePayload {
                index: 0,
                new_name: "B".to_string(),
            }),
        );
        assert_eq!(state, state_with(vec![counter("B", 0)], None));
    }
}
