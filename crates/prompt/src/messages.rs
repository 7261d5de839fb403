//! User-facing messages.
//!
//! Every message a caller can see on failure lives here so wording stays
//! consistent across the blocking and streaming paths. Raw internal error
//! text is never shown to users.

/// The caller submitted no question at all.
pub const NO_QUESTION: &str =
    "Please provide a question about building codes or zoning regulations.";

/// Generic processing failure.
pub const PROCESSING_ERROR: &str =
    "I apologize, but I encountered an error while processing your building code query. Please try again.";

/// Retrieval found nothing usable.
pub const NO_RESULTS: &str =
    "I could not find any relevant building codes for your query. Please try rephrasing or being more specific about the municipality and topic.";

/// The primary document index is unreachable.
pub const DATABASE_UNAVAILABLE: &str =
    "The regulatory database is currently unavailable. Please try again in a few minutes.";

/// Citations were found but could not be verified.
pub const VERIFICATION_FAILED: &str =
    "I found relevant information but could not verify the citations. Please use this information with caution.";

/// Synthesis produced no answer.
pub const SYNTHESIS_FAILED: &str =
    "I was unable to compose an answer from the retrieved regulations. Please try again.";

/// A phase exceeded its time budget.
pub const TIMED_OUT: &str =
    "Your query took too long to process. Please try a more specific question.";

/// Trailing notice for the streaming path.
pub const STREAM_ERROR_NOTICE: &str =
    "\n\nAn error occurred while processing your request. Please try again.";
