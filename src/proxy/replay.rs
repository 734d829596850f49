use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use axum::body::Body;
use bytes::Bytes;
use http::HeaderMap;
use http_body::{Body as HttpBody, Frame, SizeHint};

/// How much of a request body the forwarder will hold for a possible retry.
/// Requests that stream more than this are still proxied, but lose their
/// retry.
pub(crate) const MAX_REPLAY_BYTES: usize = 64 * 1024;

/// A request body that can be sent twice.
///
/// The first handle streams the inbound body through to the upstream while
/// recording the bytes it has produced, up to [`MAX_REPLAY_BYTES`]. A clone
/// re-yields the recorded prefix before continuing with whatever the
/// original never consumed, which is what makes the connection-refused retry
/// possible without buffering arbitrary uploads.
pub(crate) struct ReplayBody {
	shared: Arc<Mutex<Shared>>,
	/// Data chunks this handle has already yielded.
	cursor: usize,
	sent_trailers: bool,
}

struct Shared {
	inner: Body,
	/// Recorded data chunks, in order, while under the cap.
	chunks: Vec<Bytes>,
	/// Total data chunks ever pulled from `inner`.
	emitted: usize,
	buffered: usize,
	trailers: Option<HeaderMap>,
	capped: bool,
	complete: bool,
}

impl ReplayBody {
	pub(crate) fn new(inner: Body) -> Self {
		ReplayBody {
			shared: Arc::new(Mutex::new(Shared {
				inner,
				chunks: Vec::new(),
				emitted: 0,
				buffered: 0,
				trailers: None,
				capped: false,
				complete: false,
			})),
			cursor: 0,
			sent_trailers: false,
		}
	}

	/// True once the body outgrew the replay buffer; a retry is no longer
	/// possible for this request.
	pub(crate) fn is_capped(&self) -> bool {
		self.shared.lock().expect("replay lock poisoned").capped
	}
}

impl Clone for ReplayBody {
	fn clone(&self) -> Self {
		ReplayBody {
			shared: self.shared.clone(),
			cursor: 0,
			sent_trailers: false,
		}
	}
}

impl HttpBody for ReplayBody {
	type Data = Bytes;
	type Error = axum::Error;

	fn poll_frame(
		self: Pin<&mut Self>,
		cx: &mut Context<'_>,
	) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
		let this = self.get_mut();
		let mut shared = this.shared.lock().expect("replay lock poisoned");

		// Serve the recorded prefix first.
		if this.cursor < shared.chunks.len() {
			let chunk = shared.chunks[this.cursor].clone();
			this.cursor += 1;
			return Poll::Ready(Some(Ok(Frame::data(chunk))));
		}

		// This handle is behind data that was discarded at the cap.
		if this.cursor < shared.emitted {
			return Poll::Ready(Some(Err(axum::Error::new(
				"replay body discarded after exceeding the buffer cap",
			))));
		}

		if shared.complete {
			if let Some(trailers) = shared.trailers.clone() {
				if !this.sent_trailers {
					this.sent_trailers = true;
					return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
				}
			}
			return Poll::Ready(None);
		}

		match Pin::new(&mut shared.inner).poll_frame(cx) {
			Poll::Pending => Poll::Pending,
			Poll::Ready(None) => {
				shared.complete = true;
				if let Some(trailers) = shared.trailers.clone() {
					if !this.sent_trailers {
						this.sent_trailers = true;
						return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
					}
				}
				Poll::Ready(None)
			},
			Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(err))),
			Poll::Ready(Some(Ok(frame))) => {
				let frame = match frame.into_data() {
					Ok(data) => {
						shared.emitted += 1;
						if !shared.capped {
							shared.buffered += data.len();
							if shared.buffered > MAX_REPLAY_BYTES {
								shared.capped = true;
								shared.chunks.clear();
							} else {
								shared.chunks.push(data.clone());
							}
						}
						this.cursor = shared.emitted;
						Frame::data(data)
					},
					Err(frame) => match frame.into_trailers() {
						Ok(trailers) => {
							shared.trailers = Some(trailers.clone());
							this.sent_trailers = true;
							Frame::trailers(trailers)
						},
						Err(frame) => frame,
					},
				};
				Poll::Ready(Some(Ok(frame)))
			},
		}
	}

	fn is_end_stream(&self) -> bool {
		let shared = self.shared.lock().expect("replay lock poisoned");
		shared.complete
			&& self.cursor >= shared.chunks.len()
			&& (shared.trailers.is_none() || self.sent_trailers)
	}

	fn size_hint(&self) -> SizeHint {
		let shared = self.shared.lock().expect("replay lock poisoned");
		let replay: u64 = shared.chunks[self.cursor.min(shared.chunks.len())..]
			.iter()
			.map(|c| c.len() as u64)
			.sum();
		if shared.complete {
			SizeHint::with_exact(replay)
		} else {
			let inner = shared.inner.size_hint();
			let mut hint = SizeHint::new();
			hint.set_lower(replay + inner.lower());
			if let Some(upper) = inner.upper() {
				hint.set_upper(replay + upper);
			}
			hint
		}
	}
}

#[cfg(test)]
mod tests {
	use http_body_util::BodyExt;

	use super::*;

	fn streamed(parts: Vec<&'static str>) -> Body {
		let frames = parts
			.into_iter()
			.map(|p| Ok::<_, axum::Error>(Frame::data(Bytes::from_static(p.as_bytes()))));
		Body::new(http_body_util::StreamBody::new(futures_util::stream::iter(
			frames,
		)))
	}

	#[tokio::test]
	async fn passes_data_through() {
		let body = ReplayBody::new(streamed(vec!["hello", " world"]));
		let got = body.collect().await.unwrap().to_bytes();
		assert_eq!(got, Bytes::from_static(b"hello world"));
	}

	#[tokio::test]
	async fn clone_replays_consumed_data() {
		let body = ReplayBody::new(streamed(vec!["hello", " world"]));
		let replay = body.clone();

		let got = body.collect().await.unwrap().to_bytes();
		assert_eq!(got, Bytes::from_static(b"hello world"));

		let got = replay.collect().await.unwrap().to_bytes();
		assert_eq!(got, Bytes::from_static(b"hello world"));
	}

	#[tokio::test]
	async fn unconsumed_original_still_replays_fully() {
		let body = ReplayBody::new(streamed(vec!["payload"]));
		let replay = body.clone();
		drop(body);

		let got = replay.collect().await.unwrap().to_bytes();
		assert_eq!(got, Bytes::from_static(b"payload"));
	}

	#[tokio::test]
	async fn oversized_body_caps_the_replay() {
		let big = "x".repeat(MAX_REPLAY_BYTES + 1);
		let frames = vec![Ok::<_, axum::Error>(Frame::data(Bytes::from(big)))];
		let body = ReplayBody::new(Body::new(http_body_util::StreamBody::new(
			futures_util::stream::iter(frames),
		)));
		let replay = body.clone();

		let got = body.collect().await.unwrap().to_bytes();
		assert_eq!(got.len(), MAX_REPLAY_BYTES + 1);
		assert!(replay.is_capped());

		let err = replay.collect().await.unwrap_err();
		assert!(err.to_string().contains("replay body discarded"));
	}
}
