use std::io;
use std::time::Duration;

use tokio::time::timeout;
use tokio::time::error::Elapsed;


#[inline]
pub(crate) fn flatten_timeout<T>(r: Result<Result<T, io::Error>, Elapsed>, msg: &'static str) -> Result<T, io::Error> {
	match r {
		Ok(r) => r,
		Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, msg)),
	}
}

/// Run an io future, failing with [`io::ErrorKind::TimedOut`] if it does not complete within `t`.
#[inline]
pub(crate) async fn iotimeout<T, F: std::future::Future<Output = io::Result<T>>>(t: Duration, f: F, msg: &'static str) -> io::Result<T> {
	flatten_timeout(timeout(t, f).await, msg)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn elapsed_maps_to_timed_out() {
		let result: io::Result<()> = iotimeout(
			Duration::from_millis(10),
			async {
				tokio::time::sleep(Duration::from_secs(60)).await;
				Ok(())
			},
			"too slow",
		).await;
		let err = result.unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::TimedOut);
		assert_eq!(err.to_string(), "too slow");
	}

	#[tokio::test]
	async fn inner_error_passes_through() {
		let result: io::Result<()> = iotimeout(
			Duration::from_secs(1),
			async { Err(io::Error::new(io::ErrorKind::ConnectionRefused, "nope")) },
			"too slow",
		).await;
		assert_eq!(result.unwrap_err().kind(), io::ErrorKind::ConnectionRefused);
	}
}
