//! Wire-level helpers shared by the service implementations: parsing CIDs
//! out of request fields and mapping the directory's error taxonomy onto
//! gRPC status codes (spec.md §7).

use dirnode_core::{Cid, Error};
use tonic::Status;

pub fn parse_cid(value: &str) -> Result<Cid, Status> {
    value.parse().map_err(error_to_status)
}

/// Maps the directory's internal error taxonomy onto gRPC status codes
/// (spec.md §7).
pub fn error_to_status(error: Error) -> Status {
    let message = error.to_string();
    match error {
        Error::InvalidArgument(_) => Status::invalid_argument(message),
        Error::NotFound(_) => Status::not_found(message),
        Error::AlreadyExists(_) => Status::already_exists(message),
        Error::PermissionDenied(_) => Status::permission_denied(message),
        Error::Unauthenticated(_) => Status::unauthenticated(message),
        Error::DeadlineExceeded(_) => Status::deadline_exceeded(message),
        Error::Unavailable(_) => Status::unavailable(message),
        Error::FailedPrecondition(_) => Status::failed_precondition(message),
        Error::Internal(_) => Status::internal(message),
    }
}
