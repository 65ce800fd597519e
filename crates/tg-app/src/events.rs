use crate::gateway::RemoteStatus;
use crate::scene::ObjectHandle;

/// Something that happened to a job, for the front end to show
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Submitted {
        id: String,
        placeholder: String,
    },
    Progress {
        id: String,
        status: RemoteStatus,
    },
    Completed {
        id: String,
        object: ObjectHandle,
    },
    Failed {
        id: String,
        reason: String,
    },
    Removed {
        id: String,
    },
}

