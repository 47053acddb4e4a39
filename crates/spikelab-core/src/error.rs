//! Error types for the simulation core

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in the simulation core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Referenced identifier is not owned by any neuron
    #[error("Neuron {id} not found")]
    MissingEntity {
        /// Identifier that failed to resolve
        id: String,
    },

    /// Neuron with this identifier already exists
    #[error("Neuron {id} already exists")]
    NeuronExists {
        /// Duplicate identifier
        id: String,
    },

    /// Edge between the two neurons already exists
    #[error("Edge {from} -> {to} already exists")]
    EdgeExists {
        /// Presynaptic neuron id
        from: String,
        /// Postsynaptic neuron id
        to: String,
    },

    /// Edge between the two neurons does not exist
    #[error("Edge {from} -> {to} not found")]
    EdgeNotFound {
        /// Presynaptic neuron id
        from: String,
        /// Postsynaptic neuron id
        to: String,
    },

    /// Edge forbidden by the topology policy
    #[error("Edge {from} -> {to} violates topology policy")]
    PolicyViolation {
        /// Presynaptic neuron id
        from: String,
        /// Postsynaptic neuron id
        to: String,
    },

    /// Invalid parameter value
    #[error("Invalid parameter {parameter}: {value} (expected {constraint})")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value
        value: String,
        /// Constraint description
        constraint: String,
    },
}

impl CoreError {
    /// Create a missing entity error
    pub fn missing_entity(id: impl Into<String>) -> Self {
        Self::MissingEntity { id: id.into() }
    }

    /// Create a duplicate neuron error
    pub fn neuron_exists(id: impl Into<String>) -> Self {
        Self::NeuronExists { id: id.into() }
    }

    /// Create a duplicate edge error
    pub fn edge_exists(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::EdgeExists {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create a missing edge error
    pub fn edge_not_found(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::EdgeNotFound {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create a policy violation error
    pub fn policy_violation(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::PolicyViolation {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        parameter: impl Into<String>,
        value: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            constraint: constraint.into(),
        }
    }
}
