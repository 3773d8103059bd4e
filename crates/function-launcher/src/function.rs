// ABOUTME: A function offered to the broker.
// ABOUTME: Pairs the catalog description with the registration record sent on the stream.

use launcher_proto::{FunctionRegistration, FunctionRegistrationState};
use uuid::Uuid;

use crate::catalog::FunctionDescription;

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    id: Uuid,
    description: FunctionDescription,
    registration: FunctionRegistration,
}

impl Function {
    /// A function that has not been registered yet.
    pub fn new(id: Uuid, description: FunctionDescription) -> Self {
        let registration = FunctionRegistration {
            id: id.to_string(),
            name: description.name.clone(),
            signature: description.signature.clone(),
            version: description.version.clone(),
            description: description.description.clone(),
            state: FunctionRegistrationState::Unspecified as i32,
        };
        Self {
            id,
            description,
            registration,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn description(&self) -> &FunctionDescription {
        &self.description
    }

    pub fn registration(&self) -> &FunctionRegistration {
        &self.registration
    }

    /// Executor kind that runs this function.
    pub fn executor(&self) -> &str {
        &self.description.executor
    }

    pub fn runtime(&self) -> &str {
        &self.description.runtime
    }

    pub fn state(&self) -> FunctionRegistrationState {
        self.registration.state()
    }

    pub fn set_state(&mut self, state: FunctionRegistrationState) {
        self.registration.set_state(state);
    }
}
