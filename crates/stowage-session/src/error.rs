use thiserror::Error;

use stowage_types::ObjectId;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no field {field} on {type_name}")]
    UnknownField { type_name: String, field: String },

    #[error("object {0} is not registered in this session")]
    UnknownObject(ObjectId),

    #[error(transparent)]
    Graph(#[from] stowage_graph::GraphError),

    #[error(transparent)]
    Transfer(#[from] stowage_graph::TransferError),

    #[error(transparent)]
    Handler(#[from] stowage_handler::HandlerError),

    #[error(transparent)]
    Identity(#[from] stowage_registry::RegistryError),

    #[error(transparent)]
    Dictionary(#[from] stowage_dictionary::DictionaryError),

    #[error(transparent)]
    Mapping(#[from] stowage_mapping::MappingError),

    #[error(transparent)]
    Type(#[from] stowage_types::TypeError),
}

pub type SessionResult<T> = Result<T, SessionError>;
