use sentry_core::io::{FetchError, NotifyError};
use sentry_core::link::{
    LinkError, LinkResponse, fetch_result, notify_result, parse_response, parse_response_bytes,
};

#[test]
fn parses_state_lines() {
    assert_eq!(parse_response("STATE 1"), Ok(LinkResponse::State(1)));
    assert_eq!(parse_response("STATE 0\r\n"), Ok(LinkResponse::State(0)));
    assert_eq!(parse_response("STATE -3\n"), Ok(LinkResponse::State(-3)));
}

#[test]
fn parses_acknowledgements_and_errors() {
    assert_eq!(parse_response("OK\n"), Ok(LinkResponse::Ack));
    assert_eq!(parse_response("EMPTY"), Ok(LinkResponse::Empty));
    assert_eq!(parse_response("ERR 503"), Ok(LinkResponse::Status(503)));
}

#[test]
fn rejects_garbage() {
    for line in ["", "STATE", "STATE one", "STATE 1 2", "ERR -1", "OKAY", "state 1"] {
        assert_eq!(
            parse_response(line),
            Err(LinkError::Malformed),
            "`{line}` should be rejected"
        );
    }
}

#[test]
fn fetch_maps_responses_to_values_and_errors() {
    assert_eq!(fetch_result(parse_response_bytes(b"STATE 1\n")), Ok(1));
    assert_eq!(fetch_result(parse_response("EMPTY")), Err(FetchError::NoData));
    assert_eq!(
        fetch_result(parse_response("ERR 404")),
        Err(FetchError::Status(404))
    );
    assert_eq!(fetch_result(parse_response("OK")), Err(FetchError::Malformed));
    assert_eq!(
        fetch_result(parse_response("???")),
        Err(FetchError::Malformed)
    );
}

#[test]
fn notify_maps_responses_to_outcomes() {
    assert_eq!(notify_result(parse_response("OK")), Ok(()));
    assert_eq!(
        notify_result(parse_response("ERR 429")),
        Err(NotifyError::Status(429))
    );
    assert_eq!(
        notify_result(parse_response("STATE 1")),
        Err(NotifyError::Link)
    );
}
