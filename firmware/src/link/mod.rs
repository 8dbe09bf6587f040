//! Queues and framing for the network co-processor link.
//!
//! The control task never touches the UART. It posts [`LinkRequest`]s through
//! a [`LinkClient`] and receives [`LinkReply`]s once the link task has finished
//! the exchange. Only one fetch may be outstanding at a time; notifications
//! are fire-and-forget. While no fetch is pending, notifications leave one
//! request slot free so a poll always gets through a motion backlog.

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender, TrySendError};
use heapless::Vec;
use sentry_core::io::{FetchError, NotifyError};
use sentry_core::link::{
    LinkError, LinkRequest, LinkResponse, MAX_RESPONSE_LEN, fetch_result, notify_result,
    parse_response_bytes,
};

/// Requests buffered between the control and link tasks.
pub const REQUEST_QUEUE_DEPTH: usize = 2;

/// Request slots notifications may not take while no fetch is pending.
const FETCH_RESERVE: usize = 1;

/// Replies buffered between the link and control tasks.
pub const REPLY_QUEUE_DEPTH: usize = 2;

#[cfg(target_os = "none")]
type LinkMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
type LinkMutex = NoopRawMutex;

pub type RequestQueue = Channel<LinkMutex, LinkRequest, REQUEST_QUEUE_DEPTH>;
pub type RequestSender<'a> = Sender<'a, LinkMutex, LinkRequest, REQUEST_QUEUE_DEPTH>;
pub type RequestReceiver<'a> = Receiver<'a, LinkMutex, LinkRequest, REQUEST_QUEUE_DEPTH>;

pub type ReplyQueue = Channel<LinkMutex, LinkReply, REPLY_QUEUE_DEPTH>;
pub type ReplySender<'a> = Sender<'a, LinkMutex, LinkReply, REPLY_QUEUE_DEPTH>;
pub type ReplyReceiver<'a> = Receiver<'a, LinkMutex, LinkReply, REPLY_QUEUE_DEPTH>;

/// Completed exchange handed back to the control task.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkReply {
    Fetched(Result<i32, FetchError>),
    Notified(Result<(), NotifyError>),
}

/// Why an exchange produced no usable response line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExchangeError {
    /// UART read or write failed.
    Io,
    Timeout,
    Parse(LinkError),
}

/// Maps the outcome of one exchange to the reply for `request`.
pub fn reply_for(request: LinkRequest, result: Result<LinkResponse, ExchangeError>) -> LinkReply {
    match request {
        LinkRequest::FetchState => LinkReply::Fetched(match result {
            Ok(response) => fetch_result(Ok(response)),
            Err(ExchangeError::Parse(err)) => fetch_result(Err(err)),
            Err(ExchangeError::Io) => Err(FetchError::Link),
            Err(ExchangeError::Timeout) => Err(FetchError::Timeout),
        }),
        LinkRequest::NotifyMotion => LinkReply::Notified(match result {
            Ok(response) => notify_result(Ok(response)),
            Err(ExchangeError::Parse(err)) => notify_result(Err(err)),
            Err(ExchangeError::Io) => Err(NotifyError::Link),
            Err(ExchangeError::Timeout) => Err(NotifyError::Timeout),
        }),
    }
}

/// Whether `response` is a possible answer to `request`.
///
/// Anything else is a late line from an exchange that already timed out.
pub fn answers(request: LinkRequest, response: LinkResponse) -> bool {
    matches!(
        (request, response),
        (_, LinkResponse::Status(_))
            | (
                LinkRequest::FetchState,
                LinkResponse::State(_) | LinkResponse::Empty
            )
            | (LinkRequest::NotifyMotion, LinkResponse::Ack)
    )
}

/// Control-side handle on the request queue.
pub struct LinkClient<'a> {
    requests: RequestSender<'a>,
    fetch_pending: bool,
}

impl<'a> LinkClient<'a> {
    pub fn new(requests: RequestSender<'a>) -> Self {
        Self {
            requests,
            fetch_pending: false,
        }
    }

    pub fn fetch_pending(&self) -> bool {
        self.fetch_pending
    }

    /// Queues a fetch. Returns `Ok(false)` when one is already in flight.
    pub fn request_fetch(&mut self) -> Result<bool, FetchError> {
        if self.fetch_pending {
            return Ok(false);
        }
        match self.requests.try_send(LinkRequest::FetchState) {
            Ok(()) => {
                self.fetch_pending = true;
                Ok(true)
            }
            Err(TrySendError::Full(_)) => Err(FetchError::Link),
        }
    }

    /// Queues a motion notification without waiting for the result.
    ///
    /// Reports [`NotifyError::Busy`] rather than take the slot the next fetch needs.
    pub fn send_notify(&mut self) -> Result<(), NotifyError> {
        let reserved = if self.fetch_pending { 0 } else { FETCH_RESERVE };
        if self.requests.free_capacity() <= reserved {
            return Err(NotifyError::Busy);
        }
        self.requests
            .try_send(LinkRequest::NotifyMotion)
            .map_err(|_| NotifyError::Busy)
    }

    /// Must be called for every reply so the next fetch can be issued.
    pub fn on_reply(&mut self, reply: &LinkReply) {
        if matches!(reply, LinkReply::Fetched(_)) {
            self.fetch_pending = false;
        }
    }
}

/// Assembles response bytes into lines.
pub struct LineBuffer {
    bytes: Vec<u8, MAX_RESPONSE_LEN>,
    overflow: bool,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            bytes: Vec::new(),
            overflow: false,
        }
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.overflow = false;
    }

    /// Feeds one byte. Returns the parsed line once `\n` arrives.
    pub fn push(&mut self, byte: u8) -> Option<Result<LinkResponse, LinkError>> {
        if byte == b'\n' {
            let parsed = if self.overflow {
                Err(LinkError::TooLong)
            } else {
                parse_response_bytes(&self.bytes)
            };
            self.clear();
            return Some(parsed);
        }

        if byte != b'\r' && self.bytes.push(byte).is_err() {
            self.overflow = true;
        }
        None
    }

    /// Like [`push`](Self::push), but skips complete lines that cannot answer `request`.
    pub fn push_reply(
        &mut self,
        request: LinkRequest,
        byte: u8,
    ) -> Option<Result<LinkResponse, LinkError>> {
        match self.push(byte)? {
            Ok(response) if !answers(request, response) => None,
            parsed => Some(parsed),
        }
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(buffer: &mut LineBuffer, bytes: &[u8]) -> Option<Result<LinkResponse, LinkError>> {
        bytes.iter().find_map(|byte| buffer.push(*byte))
    }

    #[test]
    fn assembles_lines_across_chunks() {
        let mut buffer = LineBuffer::new();
        assert_eq!(feed(&mut buffer, b"STA"), None);
        assert_eq!(
            feed(&mut buffer, b"TE 1\r\n"),
            Some(Ok(LinkResponse::State(1)))
        );
        assert_eq!(feed(&mut buffer, b"OK\n"), Some(Ok(LinkResponse::Ack)));
    }

    #[test]
    fn oversized_lines_are_rejected_and_resynchronised() {
        let mut buffer = LineBuffer::new();
        for _ in 0..MAX_RESPONSE_LEN + 10 {
            assert_eq!(buffer.push(b'A'), None);
        }
        assert_eq!(buffer.push(b'\n'), Some(Err(LinkError::TooLong)));
        assert_eq!(feed(&mut buffer, b"EMPTY\n"), Some(Ok(LinkResponse::Empty)));
    }

    /// Replays the chunked UART read of one exchange over the bytes that arrived.
    fn exchange(line: &mut LineBuffer, request: LinkRequest, arrived: &[u8]) -> LinkReply {
        line.clear();
        let parsed = arrived
            .chunks(4)
            .find_map(|chunk| chunk.iter().find_map(|byte| line.push_reply(request, *byte)))
            .ok_or(ExchangeError::Timeout)
            .and_then(|parsed| parsed.map_err(ExchangeError::Parse));
        reply_for(request, parsed)
    }

    #[test]
    fn late_state_line_does_not_shift_later_exchanges() {
        // The first notify sees the answer to a fetch that already timed out
        // before its own `OK`.
        let mut line = LineBuffer::new();
        let replies = [
            (LinkRequest::NotifyMotion, &b"STATE 1\nOK\n"[..]),
            (LinkRequest::FetchState, b"STATE 0\n"),
            (LinkRequest::NotifyMotion, b"OK\n"),
            (LinkRequest::FetchState, b"EMPTY\n"),
        ]
        .map(|(request, arrived)| exchange(&mut line, request, arrived));

        assert_eq!(
            replies,
            [
                LinkReply::Notified(Ok(())),
                LinkReply::Fetched(Ok(0)),
                LinkReply::Notified(Ok(())),
                LinkReply::Fetched(Err(FetchError::NoData)),
            ]
        );
    }

    #[test]
    fn late_ack_is_skipped_while_fetching() {
        let mut line = LineBuffer::new();
        assert_eq!(
            exchange(&mut line, LinkRequest::FetchState, b"OK\nERR 503\n"),
            LinkReply::Fetched(Err(FetchError::Status(503)))
        );
        assert_eq!(
            exchange(&mut line, LinkRequest::FetchState, b"OK\n"),
            LinkReply::Fetched(Err(FetchError::Timeout))
        );
    }

    #[test]
    fn garbage_still_ends_the_exchange() {
        let mut line = LineBuffer::new();
        assert_eq!(
            b"??\n".iter().find_map(|byte| line.push_reply(LinkRequest::FetchState, *byte)),
            Some(Err(LinkError::Malformed))
        );
    }

    #[test]
    fn answers_matches_request_kinds() {
        assert!(answers(LinkRequest::FetchState, LinkResponse::State(3)));
        assert!(answers(LinkRequest::FetchState, LinkResponse::Empty));
        assert!(answers(LinkRequest::FetchState, LinkResponse::Status(404)));
        assert!(!answers(LinkRequest::FetchState, LinkResponse::Ack));
        assert!(answers(LinkRequest::NotifyMotion, LinkResponse::Ack));
        assert!(answers(LinkRequest::NotifyMotion, LinkResponse::Status(500)));
        assert!(!answers(LinkRequest::NotifyMotion, LinkResponse::State(1)));
        assert!(!answers(LinkRequest::NotifyMotion, LinkResponse::Empty));
    }

    #[test]
    fn only_one_fetch_is_in_flight() {
        let queue = RequestQueue::new();
        let mut client = LinkClient::new(queue.sender());

        assert_eq!(client.request_fetch(), Ok(true));
        assert_eq!(client.request_fetch(), Ok(false));
        assert_eq!(queue.len(), 1);

        client.on_reply(&LinkReply::Notified(Ok(())));
        assert!(client.fetch_pending());

        client.on_reply(&LinkReply::Fetched(Err(FetchError::Timeout)));
        assert!(!client.fetch_pending());
    }

    #[test]
    fn notifications_leave_room_for_the_next_fetch() {
        let queue = RequestQueue::new();
        let mut client = LinkClient::new(queue.sender());

        for _ in 0..REQUEST_QUEUE_DEPTH - FETCH_RESERVE {
            assert_eq!(client.send_notify(), Ok(()));
        }
        assert_eq!(client.send_notify(), Err(NotifyError::Busy));
        assert_eq!(client.request_fetch(), Ok(true));
        assert!(queue.is_full());
    }

    #[test]
    fn pending_fetch_frees_the_reserved_slot() {
        let queue = RequestQueue::new();
        let mut client = LinkClient::new(queue.sender());

        assert_eq!(client.request_fetch(), Ok(true));
        assert_eq!(queue.try_receive(), Ok(LinkRequest::FetchState));

        for _ in 0..REQUEST_QUEUE_DEPTH {
            assert_eq!(client.send_notify(), Ok(()));
        }
        assert_eq!(client.send_notify(), Err(NotifyError::Busy));

        client.on_reply(&LinkReply::Fetched(Ok(0)));
        let _ = queue.try_receive();
        assert_eq!(client.send_notify(), Err(NotifyError::Busy));
        assert_eq!(client.request_fetch(), Ok(true));
    }

    #[test]
    fn fetch_fails_only_when_the_queue_is_full() {
        let queue = RequestQueue::new();
        let mut client = LinkClient::new(queue.sender());

        assert_eq!(client.request_fetch(), Ok(true));
        for _ in 0..REQUEST_QUEUE_DEPTH - 1 {
            assert_eq!(client.send_notify(), Ok(()));
        }
        client.on_reply(&LinkReply::Fetched(Ok(1)));

        assert_eq!(client.request_fetch(), Err(FetchError::Link));
        assert!(!client.fetch_pending());
    }

    #[test]
    fn exchange_failures_map_per_request() {
        assert_eq!(
            reply_for(LinkRequest::FetchState, Ok(LinkResponse::State(0))),
            LinkReply::Fetched(Ok(0))
        );
        assert_eq!(
            reply_for(LinkRequest::FetchState, Err(ExchangeError::Timeout)),
            LinkReply::Fetched(Err(FetchError::Timeout))
        );
        assert_eq!(
            reply_for(
                LinkRequest::FetchState,
                Err(ExchangeError::Parse(LinkError::TooLong))
            ),
            LinkReply::Fetched(Err(FetchError::Malformed))
        );
        assert_eq!(
            reply_for(LinkRequest::NotifyMotion, Err(ExchangeError::Io)),
            LinkReply::Notified(Err(NotifyError::Link))
        );
        assert_eq!(
            reply_for(LinkRequest::NotifyMotion, Ok(LinkResponse::Status(500))),
            LinkReply::Notified(Err(NotifyError::Status(500)))
        );
    }
}
