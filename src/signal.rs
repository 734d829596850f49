//! Process termination signals.

#[cfg(unix)]
pub async fn shutdown() {
	use tokio::signal::unix::{SignalKind, signal};
	use tracing::info;

	let mut interrupt = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
	let mut terminate = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");

	tokio::select! {
		_ = interrupt.recv() => info!("received SIGINT, starting shutdown"),
		_ = terminate.recv() => info!("received SIGTERM, starting shutdown"),
	}
}

#[cfg(not(unix))]
pub async fn shutdown() {
	use tracing::info;

	tokio::signal::ctrl_c()
		.await
		.expect("failed to register ctrl-c handler");
	info!("received ctrl-c, starting shutdown");
}
