//! Mapping of AWS SDK errors onto `ClientError`.

use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;

use crate::error::ClientError;

/// A service answer becomes `Rejected`; every other failure (dispatch,
/// timeout, credentials, unparseable response) becomes `Transport`.
///
/// The message keeps the full error source chain.
pub(crate) fn sdk_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> ClientError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::ServiceError(_) => ClientError::Rejected { operation, message },
        _ => ClientError::Transport { operation, message },
    }
}
