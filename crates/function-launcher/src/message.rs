// ABOUTME: Messages the launcher sends to the broker.
// ABOUTME: A closed set of variants, each mapped to one FunctionUpdate envelope.

use std::fmt;

use launcher_proto::function_update::FunctionData;
use launcher_proto::{
    FunctionBrokerToken, FunctionCall, FunctionRegistration, FunctionRegistrationState,
    FunctionUpdate, FunctionUpdateResponse, FunctionUpdateType,
};

use crate::function::Function;

/// Description sent with every token acknowledgement.
pub const TOKEN_ACK_DESCRIPTION: &str = "token updated";

/// Result of handling a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failed,
}

impl From<CallOutcome> for FunctionUpdateResponse {
    fn from(outcome: CallOutcome) -> Self {
        match outcome {
            CallOutcome::Success => FunctionUpdateResponse::Success,
            CallOutcome::Failed => FunctionUpdateResponse::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingMessage {
    /// Announce a function with its lifecycle state.
    Registration(FunctionRegistration),
    /// Answer a call, echoing it back.
    CallResponse {
        call: FunctionCall,
        outcome: CallOutcome,
        description: String,
    },
    /// Acknowledge a token refresh. Doubles as a keepalive.
    TokenAck(FunctionBrokerToken),
}

impl OutgoingMessage {
    pub fn registration(function: &Function, state: FunctionRegistrationState) -> Self {
        let mut registration = function.registration().clone();
        registration.set_state(state);
        OutgoingMessage::Registration(registration)
    }

    pub fn call_started(call: FunctionCall) -> Self {
        let description = format!("Function {} has been started successfully", call.id);
        OutgoingMessage::CallResponse {
            call,
            outcome: CallOutcome::Success,
            description,
        }
    }

    pub fn call_failed(call: FunctionCall, reason: impl fmt::Display) -> Self {
        let description = format!("Function {} could not be started: {}", call.id, reason);
        OutgoingMessage::CallResponse {
            call,
            outcome: CallOutcome::Failed,
            description,
        }
    }

    pub fn token_ack(token: FunctionBrokerToken) -> Self {
        OutgoingMessage::TokenAck(token)
    }
}

impl From<OutgoingMessage> for FunctionUpdate {
    fn from(message: OutgoingMessage) -> Self {
        let mut update = FunctionUpdate::default();
        match message {
            OutgoingMessage::Registration(registration) => {
                update.set_type(FunctionUpdateType::Request);
                update.function_data = Some(FunctionData::FunctionRegistration(registration));
            }
            OutgoingMessage::CallResponse {
                call,
                outcome,
                description,
            } => {
                update.set_type(FunctionUpdateType::Response);
                update.set_response(outcome.into());
                update.response_description = description;
                update.function_data = Some(FunctionData::FunctionCall(call));
            }
            OutgoingMessage::TokenAck(token) => {
                update.set_type(FunctionUpdateType::Response);
                update.set_response(FunctionUpdateResponse::Success);
                update.response_description = TOKEN_ACK_DESCRIPTION.to_string();
                update.function_data = Some(FunctionData::FunctionBrokerToken(token));
            }
        }
        update
    }
}

impl fmt::Display for OutgoingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutgoingMessage::Registration(registration) => write!(
                f,
                "registration of {} ({}) as {:?}",
                registration.name,
                registration.id,
                registration.state()
            ),
            OutgoingMessage::CallResponse {
                outcome,
                description,
                ..
            } => write!(f, "call response {:?}: {}", outcome, description),
            OutgoingMessage::TokenAck(_) => write!(f, "token acknowledgement"),
        }
    }
}
