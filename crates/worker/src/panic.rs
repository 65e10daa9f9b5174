use std::any::Any;

/// Extracts a human-readable message from a panic payload.
///
/// Returns `None` when the payload is neither `&str` nor `String`.
pub fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
	if let Some(s) = payload.downcast_ref::<&str>() {
		Some((*s).to_string())
	} else {
		payload.downcast_ref::<String>().cloned()
	}
}
