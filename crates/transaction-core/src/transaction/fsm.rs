//! Server transaction state machines as pure transition tables.
//!
//! [`transition`] maps `(kind, state, input)` to the next state and the list
//! of actions the caller must perform, in order. It performs no I/O and
//! touches no timers, which keeps the RFC 3261 tables testable on their own.
//! The [`ServerTransaction`](crate::server::ServerTransaction) executor runs
//! the returned actions.
//!
//! Inputs that are allowed but carry no meaning in a state (a stale timer, a
//! retransmitted ACK) yield a transition to the same state with no actions.
//! Response submissions that are not allowed yield
//! [`Error::InvalidStateTransition`].

use std::fmt;

use sigstack_sip_core::StatusCode;

use crate::error::{Error, Result};
use crate::timer::TimerType;
use crate::transaction::{TransactionKind, TransactionState};

/// Something that happened to a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// The request that creates the transaction
    Request,
    /// The same request arrived again
    Retransmission,
    /// An ACK matching the transaction
    Ack,
    /// The TU submitted a 1xx
    Provisional,
    /// The TU submitted a 2xx
    Success,
    /// The TU submitted a 300-699
    Failure,
    /// A timer expired
    TimerFired(TimerType),
    /// Sending through the listening point failed
    TransportError,
}

impl Input {
    /// Classifies a response status submitted by the TU
    pub fn for_status(status: StatusCode) -> Self {
        if status.is_provisional() {
            Input::Provisional
        } else if status.is_success() {
            Input::Success
        } else {
            Input::Failure
        }
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Request => write!(f, "Request"),
            Input::Retransmission => write!(f, "Retransmission"),
            Input::Ack => write!(f, "Ack"),
            Input::Provisional => write!(f, "Provisional"),
            Input::Success => write!(f, "Success"),
            Input::Failure => write!(f, "Failure"),
            Input::TimerFired(timer) => write!(f, "Timer{timer}"),
            Input::TransportError => write!(f, "TransportError"),
        }
    }
}

/// What the transaction user is told
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// ACK received for a non-2xx final response
    AckReceived,
    /// Timer H expired without an ACK
    Timeout,
    /// A send failed
    TransportError,
}

/// Side effect requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// (Re)send the last response, if there is one
    SendLastResponse,
    /// Arm a timer with its initial duration
    StartTimer(TimerType),
    /// Re-arm a timer with its backed-off duration
    BackoffTimer(TimerType),
    /// Disarm one timer
    CancelTimer(TimerType),
    /// Disarm every timer
    CancelTimers,
    /// Tell the transaction user
    Notify(Notification),
    /// Remove the transaction from its manager
    Delete,
}

/// Result of applying one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State after the actions have run
    pub next: TransactionState,
    /// Actions to perform, in order
    pub actions: Vec<Action>,
}

impl Transition {
    fn to(next: TransactionState, actions: Vec<Action>) -> Self {
        Self { next, actions }
    }

    fn stay(state: TransactionState) -> Self {
        Self {
            next: state,
            actions: Vec::new(),
        }
    }
}

/// Computes the transition for `input` in `state`
pub fn transition(
    kind: TransactionKind,
    state: TransactionState,
    input: &Input,
) -> Result<Transition> {
    use TransactionState::*;

    // Rules shared by both machines
    match (state, input) {
        (Initial, Input::Request) => return Ok(Transition::to(Proceeding, Vec::new())),
        (Initial, _) | (_, Input::Request) => return Err(invalid(state, input)),
        (Terminated, Input::Provisional | Input::Success | Input::Failure) => {
            return Err(invalid(state, input))
        }
        (Terminated, _) => return Ok(Transition::stay(state)),
        (_, Input::TransportError) => {
            return Ok(Transition::to(
                Terminated,
                vec![
                    Action::CancelTimers,
                    Action::Notify(Notification::TransportError),
                    Action::Delete,
                ],
            ))
        }
        _ => {}
    }

    match kind {
        TransactionKind::InviteServer => invite(state, input),
        TransactionKind::NonInviteServer => non_invite(state, input),
    }
}

fn invite(state: TransactionState, input: &Input) -> Result<Transition> {
    use TransactionState::*;

    let transition = match (state, input) {
        (Proceeding, Input::Provisional) => {
            Transition::to(Proceeding, vec![Action::SendLastResponse])
        }
        (Proceeding, Input::Retransmission) => {
            Transition::to(Proceeding, vec![Action::SendLastResponse])
        }
        (Proceeding, Input::Success) => Transition::to(
            Terminated,
            vec![Action::SendLastResponse, Action::CancelTimers, Action::Delete],
        ),
        (Proceeding, Input::Failure) => Transition::to(
            Completed,
            vec![
                Action::SendLastResponse,
                Action::StartTimer(TimerType::G),
                Action::StartTimer(TimerType::H),
            ],
        ),

        (Completed, Input::Retransmission) => {
            Transition::to(Completed, vec![Action::SendLastResponse])
        }
        (Completed, Input::TimerFired(TimerType::G)) => Transition::to(
            Completed,
            vec![Action::SendLastResponse, Action::BackoffTimer(TimerType::G)],
        ),
        (Completed, Input::TimerFired(TimerType::H)) => Transition::to(
            Terminated,
            vec![
                Action::CancelTimers,
                Action::Notify(Notification::Timeout),
                Action::Delete,
            ],
        ),
        (Completed, Input::Ack) => Transition::to(
            Confirmed,
            vec![
                Action::CancelTimer(TimerType::G),
                Action::CancelTimer(TimerType::H),
                Action::StartTimer(TimerType::I),
                Action::Notify(Notification::AckReceived),
            ],
        ),

        (Confirmed, Input::TimerFired(TimerType::I)) => {
            Transition::to(Terminated, vec![Action::CancelTimers, Action::Delete])
        }

        (Completed | Confirmed, Input::Provisional | Input::Success | Input::Failure) => {
            return Err(invalid(state, input))
        }

        // ACK before a final response, ACK and request retransmissions in
        // Confirmed, timers that no longer apply
        _ => Transition::stay(state),
    };
    Ok(transition)
}

fn non_invite(state: TransactionState, input: &Input) -> Result<Transition> {
    use TransactionState::*;

    let transition = match (state, input) {
        (Proceeding, Input::Provisional) => {
            Transition::to(Proceeding, vec![Action::SendLastResponse])
        }
        (Proceeding | Completed, Input::Retransmission) => {
            Transition::to(state, vec![Action::SendLastResponse])
        }
        (Proceeding, Input::Success | Input::Failure) => Transition::to(
            Completed,
            vec![Action::SendLastResponse, Action::StartTimer(TimerType::J)],
        ),
        (Completed, Input::TimerFired(TimerType::J)) => {
            Transition::to(Terminated, vec![Action::CancelTimers, Action::Delete])
        }
        (Completed | Confirmed, Input::Provisional | Input::Success | Input::Failure) => {
            return Err(invalid(state, input))
        }
        _ => Transition::stay(state),
    };
    Ok(transition)
}

fn invalid(state: TransactionState, input: &Input) -> Error {
    Error::InvalidStateTransition {
        state,
        input: input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransactionState::*;

    const INVITE: TransactionKind = TransactionKind::InviteServer;
    const NON_INVITE: TransactionKind = TransactionKind::NonInviteServer;

    fn next(kind: TransactionKind, state: TransactionState, input: Input) -> Transition {
        transition(kind, state, &input).unwrap()
    }

    #[test]
    fn request_creates_proceeding_for_both_kinds() {
        for kind in [INVITE, NON_INVITE] {
            let t = next(kind, Initial, Input::Request);
            assert_eq!(t.next, Proceeding);
            assert!(t.actions.is_empty());
        }
    }

    #[test]
    fn invite_success_sends_then_deletes() {
        let t = next(INVITE, Proceeding, Input::Success);
        assert_eq!(t.next, Terminated);
        assert_eq!(
            t.actions,
            vec![Action::SendLastResponse, Action::CancelTimers, Action::Delete]
        );
    }

    #[test]
    fn invite_failure_arms_g_and_h() {
        let t = next(INVITE, Proceeding, Input::Failure);
        assert_eq!(t.next, Completed);
        assert_eq!(
            t.actions,
            vec![
                Action::SendLastResponse,
                Action::StartTimer(TimerType::G),
                Action::StartTimer(TimerType::H)
            ]
        );
    }

    #[test]
    fn invite_completed_handles_retransmission_g_h_and_ack() {
        let t = next(INVITE, Completed, Input::Retransmission);
        assert_eq!((t.next, t.actions), (Completed, vec![Action::SendLastResponse]));

        let t = next(INVITE, Completed, Input::TimerFired(TimerType::G));
        assert_eq!(
            t.actions,
            vec![Action::SendLastResponse, Action::BackoffTimer(TimerType::G)]
        );

        let t = next(INVITE, Completed, Input::TimerFired(TimerType::H));
        assert_eq!(t.next, Terminated);
        assert!(t.actions.contains(&Action::Notify(Notification::Timeout)));
        assert_eq!(t.actions.last(), Some(&Action::Delete));

        let t = next(INVITE, Completed, Input::Ack);
        assert_eq!(t.next, Confirmed);
        assert_eq!(
            t.actions,
            vec![
                Action::CancelTimer(TimerType::G),
                Action::CancelTimer(TimerType::H),
                Action::StartTimer(TimerType::I),
                Action::Notify(Notification::AckReceived)
            ]
        );
    }

    #[test]
    fn invite_confirmed_absorbs_until_timer_i() {
        for input in [Input::Ack, Input::Retransmission, Input::TimerFired(TimerType::G)] {
            let t = next(INVITE, Confirmed, input);
            assert_eq!(t, Transition::stay(Confirmed));
        }
        let t = next(INVITE, Confirmed, Input::TimerFired(TimerType::I));
        assert_eq!(t.next, Terminated);
        assert_eq!(t.actions, vec![Action::CancelTimers, Action::Delete]);
    }

    #[test]
    fn second_final_response_is_rejected() {
        for input in [Input::Provisional, Input::Success, Input::Failure] {
            for state in [Completed, Confirmed, Terminated] {
                assert!(matches!(
                    transition(INVITE, state, &input),
                    Err(Error::InvalidStateTransition { .. })
                ));
            }
            assert!(transition(NON_INVITE, Completed, &input).is_err());
        }
    }

    #[test]
    fn transport_error_terminates_from_any_live_state() {
        for state in [Proceeding, Completed, Confirmed] {
            let t = next(INVITE, state, Input::TransportError);
            assert_eq!(t.next, Terminated);
            assert_eq!(
                t.actions,
                vec![
                    Action::CancelTimers,
                    Action::Notify(Notification::TransportError),
                    Action::Delete
                ]
            );
        }
        assert_eq!(
            next(NON_INVITE, Terminated, Input::TransportError),
            Transition::stay(Terminated)
        );
    }

    #[test]
    fn stale_timers_are_no_ops() {
        assert_eq!(
            next(INVITE, Proceeding, Input::TimerFired(TimerType::H)),
            Transition::stay(Proceeding)
        );
        assert_eq!(
            next(INVITE, Terminated, Input::TimerFired(TimerType::G)),
            Transition::stay(Terminated)
        );
        assert_eq!(
            next(NON_INVITE, Proceeding, Input::TimerFired(TimerType::J)),
            Transition::stay(Proceeding)
        );
    }

    #[test]
    fn non_invite_final_arms_j_then_terminates() {
        for input in [Input::Success, Input::Failure] {
            let t = next(NON_INVITE, Proceeding, input);
            assert_eq!(t.next, Completed);
            assert_eq!(
                t.actions,
                vec![Action::SendLastResponse, Action::StartTimer(TimerType::J)]
            );
        }
        let t = next(NON_INVITE, Completed, Input::Retransmission);
        assert_eq!(t.actions, vec![Action::SendLastResponse]);

        let t = next(NON_INVITE, Completed, Input::TimerFired(TimerType::J));
        assert_eq!(t.next, Terminated);
        assert_eq!(t.actions, vec![Action::CancelTimers, Action::Delete]);

        assert_eq!(next(NON_INVITE, Completed, Input::Ack), Transition::stay(Completed));
    }

    #[test]
    fn request_outside_initial_is_rejected() {
        assert!(transition(INVITE, Proceeding, &Input::Request).is_err());
        assert!(transition(NON_INVITE, Initial, &Input::Ack).is_err());
    }

    #[test]
    fn status_classification() {
        assert_eq!(Input::for_status(StatusCode::Ringing), Input::Provisional);
        assert_eq!(Input::for_status(StatusCode::Ok), Input::Success);
        assert_eq!(Input::for_status(StatusCode::BusyHere), Input::Failure);
        assert_eq!(Input::for_status(StatusCode::MovedTemporarily), Input::Failure);
    }
}
