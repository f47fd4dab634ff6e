use std::time::Duration;

use crate::config::AddressFamily;


macro_rules! strerror {
	($e:expr) => {
		match $e {
			Ok(v) => v,
			Err(e) => return Err(format!("{}", e)),
		}
	}
}


/// Parse a (fractional) number of seconds.
pub(crate) fn to_duration(v: &str) -> Result<Duration, String> {
	let secs = strerror!(v.trim().parse::<f64>());
	if !secs.is_finite() || secs < 0. {
		return Err(format!("duration must be a non-negative number of seconds, got {}", v))
	}
	Ok(Duration::from_secs_f64(secs))
}


pub(crate) fn to_bool(v: &str) -> Result<bool, String> {
	match v.trim() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		other => Err(format!("expected boolean, found {:?}", other)),
	}
}


pub(crate) fn to_usize(v: &str) -> Result<usize, String> {
	Ok(strerror!(v.trim().parse::<usize>()))
}


pub(crate) fn to_family(v: &str) -> Result<Option<AddressFamily>, String> {
	match v.trim() {
		"auto" | "*" => Ok(None),
		"ipv4" | "inet" | "4" => Ok(Some(AddressFamily::V4)),
		"ipv6" | "inet6" | "6" => Ok(Some(AddressFamily::V6)),
		other => Err(format!("invalid address family: {}", other)),
	}
}
