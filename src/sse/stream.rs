//! Writable/readable halves of a server-sent event stream.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::HeaderValue;
use bytes::Bytes;
use futures_util::stream;
use tokio::sync::{mpsc, oneshot};

use super::message::{format_messages, EventStreamMessage};
use crate::config::SseConfig;
use crate::event::Event;
use crate::response::{BodyStream, ResponseValue};

const SSE_CONTENT_TYPE: &str = "text/event-stream";
const SSE_CACHE_CONTROL: &str = "private, no-cache, no-store, no-transform, must-revalidate, max-age=0";

type ClosedCallback = Box<dyn FnOnce() + Send>;

struct State {
    writer: Option<mpsc::Sender<Bytes>>,
    unsent: Option<String>,
    paused: bool,
    writer_closed: bool,
    disposed: bool,
    handled: bool,
    on_closed: Vec<ClosedCallback>,
    stop_watcher: Option<oneshot::Sender<()>>,
}

struct Shared {
    state: Mutex<State>,
    reader: EventStreamReader,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the writer closed and fire callbacks. Runs at most once.
    fn settle_closed(&self) {
        let callbacks = {
            let mut state = self.lock();
            if state.writer_closed {
                return;
            }
            state.writer_closed = true;
            std::mem::take(&mut state.on_closed)
        };
        for callback in callbacks {
            callback();
        }
    }

    fn close(&self) {
        {
            let mut state = self.lock();
            state.writer.take();
            state.disposed = true;
            if let Some(stop) = state.stop_watcher.take() {
                let _ = stop.send(());
            }
        }
        self.settle_closed();
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(stop) = state.stop_watcher.take() {
            let _ = stop.send(());
        }
    }
}

/// Server-side handle of an SSE response.
///
/// Created by a handler, which pushes messages while the transport drains the
/// [`EventStreamReader`] returned by [`EventStream::send`]. Writes after the
/// peer has gone away are dropped silently.
#[derive(Clone)]
pub struct EventStream {
    shared: Arc<Shared>,
}

impl EventStream {
    pub fn new(config: &SseConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let probe = tx.clone();

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                writer: Some(tx),
                unsent: None,
                paused: false,
                writer_closed: false,
                disposed: false,
                handled: false,
                on_closed: Vec::new(),
                stop_watcher: Some(stop_tx),
            }),
            reader: EventStreamReader::new(rx),
        });

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(watch_peer(
                    Arc::downgrade(&shared),
                    probe,
                    stop_rx,
                    config.auto_close,
                ));
            }
            Err(_) => tracing::debug!("No async runtime, event stream will not observe peer closure"),
        }

        Self { shared }
    }

    /// Push one message.
    pub async fn push(&self, message: impl Into<EventStreamMessage>) {
        self.write(message.into().format()).await;
    }

    /// Push several messages as a single write.
    pub async fn push_all<I, M>(&self, messages: I)
    where
        I: IntoIterator<Item = M>,
        M: Into<EventStreamMessage>,
    {
        let messages: Vec<EventStreamMessage> = messages.into_iter().map(Into::into).collect();
        if messages.is_empty() {
            return;
        }
        self.write(format_messages(&messages)).await;
    }

    /// Buffer subsequent pushes until [`EventStream::resume`].
    pub fn pause(&self) {
        self.shared.lock().paused = true;
    }

    /// Unpause and flush everything buffered while paused.
    pub async fn resume(&self) {
        self.shared.lock().paused = false;
        self.flush().await;
    }

    /// Write and clear the pending buffer.
    pub async fn flush(&self) {
        let (writer, payload) = {
            let mut state = self.shared.lock();
            if state.writer_closed {
                return;
            }
            let Some(payload) = state.unsent.take() else {
                return;
            };
            match state.writer.clone() {
                Some(writer) => (writer, payload),
                None => return,
            }
        };
        let _ = writer.send(Bytes::from(payload)).await;
    }

    /// Close the writer. Safe to call any number of times.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Register a callback fired once the writer is closed, by either side.
    pub fn on_closed<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.shared.lock();
            if !state.writer_closed {
                state.on_closed.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Prepare the event's response for streaming and hand out the readable half.
    ///
    /// Only the first call touches status and headers; every call returns the
    /// same reader.
    pub fn send(&self, event: &mut Event) -> EventStreamReader {
        let first = {
            let mut state = self.shared.lock();
            !std::mem::replace(&mut state.handled, true)
        };

        if first {
            let multiplexed = event.is_multiplexed();
            let headers = &mut event.response.headers;
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(SSE_CONTENT_TYPE));
            headers.insert(CACHE_CONTROL, HeaderValue::from_static(SSE_CACHE_CONTROL));
            headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
            if !multiplexed {
                headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
            }
            event.response.set_status(200, None);
        }

        self.shared.reader.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock().paused
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().writer_closed
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    pub fn is_handled(&self) -> bool {
        self.shared.lock().handled
    }

    async fn write(&self, payload: String) {
        let writer = {
            let mut state = self.shared.lock();
            if state.writer_closed {
                return;
            }
            if state.paused {
                state.unsent.get_or_insert_with(String::new).push_str(&payload);
                return;
            }
            match state.writer.clone() {
                Some(writer) => writer,
                None => return,
            }
        };
        // The peer may already be gone; nothing to report.
        let _ = writer.send(Bytes::from(payload)).await;
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("EventStream")
            .field("paused", &state.paused)
            .field("writer_closed", &state.writer_closed)
            .field("disposed", &state.disposed)
            .field("handled", &state.handled)
            .field("unsent", &state.unsent.as_ref().map(String::len))
            .finish()
    }
}

async fn watch_peer(
    shared: Weak<Shared>,
    probe: mpsc::Sender<Bytes>,
    stop: oneshot::Receiver<()>,
    auto_close: bool,
) {
    tokio::select! {
        _ = probe.closed() => {}
        _ = stop => return,
    }
    drop(probe);

    let Some(shared) = shared.upgrade() else {
        return;
    };
    if auto_close {
        tracing::debug!("Event stream peer disconnected, closing");
        shared.close();
    } else {
        shared.settle_closed();
    }
}

/// Readable half of an [`EventStream`].
///
/// Clones share one underlying receiver; the first [`into_body_stream`] takes it
/// and later ones yield an empty stream.
///
/// [`into_body_stream`]: EventStreamReader::into_body_stream
#[derive(Clone)]
pub struct EventStreamReader {
    rx: Arc<Mutex<Option<mpsc::Receiver<Bytes>>>>,
}

impl EventStreamReader {
    fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(Some(rx))),
        }
    }

    /// Whether this reader and `other` drain the same stream.
    pub fn same_stream(&self, other: &EventStreamReader) -> bool {
        Arc::ptr_eq(&self.rx, &other.rx)
    }

    pub fn into_body_stream(self) -> BodyStream {
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner).take();
        match rx {
            Some(rx) => Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|chunk| (Ok(chunk), rx))
            })),
            None => Box::pin(stream::empty()),
        }
    }
}

impl fmt::Debug for EventStreamReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventStreamReader(..)")
    }
}

impl From<EventStreamReader> for ResponseValue {
    fn from(reader: EventStreamReader) -> Self {
        ResponseValue::Stream(reader.into_body_stream())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::IncomingRequest;
    use axum::http::{Method, StatusCode, Version};
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config(auto_close: bool) -> SseConfig {
        SseConfig {
            auto_close,
            ..SseConfig::default()
        }
    }

    fn event() -> Event {
        Event::new(IncomingRequest::new(Method::GET, "http://localhost/events"))
    }

    async fn collect(body: BodyStream) -> Vec<Bytes> {
        body.map(|chunk| chunk.unwrap()).collect().await
    }

    #[tokio::test]
    async fn test_push_writes_formatted_messages() {
        let stream = EventStream::new(&config(true));
        let body = stream.send(&mut event()).into_body_stream();

        stream.push("hello").await;
        stream
            .push(EventStreamMessage::new("tick").with_id("1").with_event("clock"))
            .await;
        stream.close();

        let chunks = collect(body).await;
        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(b"data: hello\n\n"),
                Bytes::from_static(b"id: 1\nevent: clock\ndata: tick\n\n"),
            ]
        );
    }

    #[tokio::test]
    async fn test_paused_pushes_flush_as_one_write() {
        let stream = EventStream::new(&config(true));
        let body = stream.send(&mut event()).into_body_stream();

        stream.pause();
        assert!(stream.is_paused());
        stream.push("one").await;
        stream.push("two").await;
        stream.push("three").await;
        stream.resume().await;
        stream.push("four").await;
        stream.close();

        let chunks = collect(body).await;
        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(b"data: one\n\ndata: two\n\ndata: three\n\n"),
                Bytes::from_static(b"data: four\n\n"),
            ]
        );
    }

    #[tokio::test]
    async fn test_push_all_is_single_write() {
        let stream = EventStream::new(&config(true));
        let body = stream.send(&mut event()).into_body_stream();
        stream.push_all(["a", "b"]).await;
        stream.close();
        assert_eq!(collect(body).await, vec![Bytes::from_static(b"data: a\n\ndata: b\n\n")]);
    }

    #[tokio::test]
    async fn test_push_after_close_is_noop() {
        let stream = EventStream::new(&config(true));
        let body = stream.send(&mut event()).into_body_stream();

        stream.close();
        stream.close();
        stream.push("late").await;
        stream.flush().await;

        assert!(stream.is_closed());
        assert!(stream.is_disposed());
        assert!(collect(body).await.is_empty());
    }

    #[tokio::test]
    async fn test_send_sets_headers_once() {
        let stream = EventStream::new(&config(true));
        let mut ev = event();
        let first = stream.send(&mut ev);

        assert_eq!(ev.response.status, Some(StatusCode::OK));
        assert_eq!(ev.response.headers["content-type"], "text/event-stream");
        assert_eq!(ev.response.headers["cache-control"], SSE_CACHE_CONTROL);
        assert_eq!(ev.response.headers["x-accel-buffering"], "no");
        assert_eq!(ev.response.headers["connection"], "keep-alive");
        assert!(stream.is_handled());

        ev.response.set_status(202, None);
        ev.response.headers.remove("x-accel-buffering");
        let second = stream.send(&mut ev);
        assert!(first.same_stream(&second));
        assert_eq!(ev.response.status, Some(StatusCode::ACCEPTED));
        assert!(ev.response.headers.get("x-accel-buffering").is_none());
    }

    #[tokio::test]
    async fn test_no_keep_alive_on_multiplexed_transport() {
        let stream = EventStream::new(&config(true));
        let mut ev = Event::new(
            IncomingRequest::new(Method::GET, "https://localhost/events").with_version(Version::HTTP_2),
        );
        stream.send(&mut ev);
        assert!(ev.response.headers.get("connection").is_none());
    }

    #[tokio::test]
    async fn test_on_closed_fires_once_on_server_close() {
        let stream = EventStream::new(&config(true));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        stream.on_closed(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        stream.close();
        stream.close();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let late = fired.clone();
        stream.on_closed(move || {
            late.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auto_close_when_peer_disconnects() {
        let stream = EventStream::new(&config(true));
        let (tx, rx) = oneshot::channel();
        stream.on_closed(move || {
            let _ = tx.send(());
        });

        let body = stream.send(&mut event()).into_body_stream();
        drop(body);

        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("closed in time")
            .unwrap();
        assert!(stream.is_closed());
        assert!(stream.is_disposed());
        stream.push("ignored").await;
    }

    #[tokio::test]
    async fn test_peer_disconnect_without_auto_close() {
        let stream = EventStream::new(&config(false));
        let (tx, rx) = oneshot::channel();
        stream.on_closed(move || {
            let _ = tx.send(());
        });

        drop(stream.send(&mut event()).into_body_stream());

        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("closed in time")
            .unwrap();
        assert!(stream.is_closed());
        assert!(!stream.is_disposed());
    }

    #[tokio::test]
    async fn test_second_reader_take_is_empty() {
        let stream = EventStream::new(&config(true));
        let mut ev = event();
        let first = stream.send(&mut ev).into_body_stream();
        let second = stream.send(&mut ev).into_body_stream();

        stream.push("only once").await;
        stream.close();

        assert!(collect(second).await.is_empty());
        assert_eq!(collect(first).await.len(), 1);
    }

    #[tokio::test]
    async fn test_dropping_handle_ends_stream() {
        let stream = EventStream::new(&config(true));
        let body = stream.send(&mut event()).into_body_stream();
        stream.push("bye").await;
        drop(stream);

        let chunks = tokio::time::timeout(Duration::from_secs(1), collect(body))
            .await
            .expect("stream ends once the handle is dropped");
        assert_eq!(chunks, vec![Bytes::from_static(b"data: bye\n\n")]);
    }

    #[test]
    fn test_without_runtime() {
        let stream = EventStream::new(&config(true));
        stream.close();
        assert!(stream.is_disposed());
    }
}
