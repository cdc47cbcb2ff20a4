//! Folds inbound frames into the campaign aggregate.
//!
//! `apply` is pure: it takes the state by value and hands back the next one,
//! plus what the caller has to react to. Per-host counters only ever add, so
//! any arrival order of the same frames ends in the same counts.

use crate::engine::protocol::{error_text, HostResult, InboundFrame};
use crate::model::{CampaignState, HostError, Outcome, Row};

/// What the owner of the state must do after a frame was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    /// The server reported the campaign finished.
    Finished,
    HostResponded { host: String, outcome: Outcome },
    ServerError(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub state: CampaignState,
    pub effect: Effect,
}

pub fn apply(mut state: CampaignState, frame: &InboundFrame) -> Applied {
    let effect = match frame {
        InboundFrame::Status(status) => {
            let finished = status.is_finished();
            state.status = Some(status.clone());
            if finished {
                state.query_is_running = false;
                Effect::Finished
            } else {
                Effect::None
            }
        }
        InboundFrame::Totals(totals) => {
            state.totals = Some(*totals);
            state.targeted = totals.count.max(state.responded);
            Effect::None
        }
        InboundFrame::Result(result) => record_host_result(&mut state, result),
        InboundFrame::Error(value) => {
            let msg = error_text(value);
            state.server_errors.push(msg.clone());
            Effect::ServerError(msg)
        }
        InboundFrame::Unknown(kind) => {
            tracing::warn!(frame_type = %kind, "ignoring unrecognized frame type");
            Effect::None
        }
    };
    Applied { state, effect }
}

fn record_host_result(state: &mut CampaignState, result: &HostResult) -> Effect {
    let outcome = classify(result);
    state.responded += 1;
    match outcome {
        Outcome::Error => {
            state.responded_with_errors += 1;
            state.errors.push(HostError {
                host_hostname: result.host.hostname.clone(),
                host_display_name: result.host.display_name.clone(),
                error: result.error.clone().unwrap_or_default(),
            });
        }
        Outcome::Results { .. } => {
            state.responded_with_results += 1;
            state
                .query_results
                .extend(result.rows.iter().map(|row| tag_row(row, result)));
        }
        Outcome::NoResults => state.responded_no_results += 1,
    }

    if state.responded > state.targeted {
        tracing::warn!(
            responded = state.responded,
            targeted = state.targeted,
            host_id = result.host.id,
            "more hosts responded than were targeted"
        );
        state.targeted = state.responded;
    }

    Effect::HostResponded {
        host: result.host.label().to_owned(),
        outcome,
    }
}

/// An error wins over rows; an empty row set means the host answered with nothing.
pub fn classify(result: &HostResult) -> Outcome {
    if result.error.is_some() {
        Outcome::Error
    } else if result.rows.is_empty() {
        Outcome::NoResults
    } else {
        Outcome::Results {
            rows: result.rows.len(),
        }
    }
}

fn tag_row(row: &Row, result: &HostResult) -> Row {
    let mut tagged = row.clone();
    tagged.insert("host_hostname".into(), result.host.hostname.clone());
    tagged.insert("host_display_name".into(), result.host.display_name.clone());
    tagged
}
