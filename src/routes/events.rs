use actix_web::{http::header, web, HttpResponse};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::state::{AppState, BookingEvent};

/// Server-sent events for the admin dashboard. Lagged receivers drop the
/// missed events and keep streaming.
pub async fn stream_bookings(state: web::Data<AppState>) -> HttpResponse {
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => Some(Ok::<web::Bytes, actix_web::Error>(event_to_bytes(&event))),
        Err(err) => {
            log::debug!("Booking event stream lagged: {err}");
            None
        }
    });

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream)
}

pub fn event_to_bytes(event: &BookingEvent) -> web::Bytes {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: {}\ndata: {}\n\n", event.kind, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_framed_for_sse() {
        let event = BookingEvent {
            kind: "booking_created".into(),
            booking_id: "b1".into(),
            status: "Pending".into(),
            username: "sam".into(),
            pitch_name: "Riverside".into(),
            booking_date: "2026-06-02".into(),
            start_time: "18:00".into(),
            end_time: "20:00".into(),
            final_price: "200.00".into(),
        };
        let bytes = event_to_bytes(&event);
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with("event: booking_created\ndata: {"));
        assert!(text.contains("\"booking_id\":\"b1\""));
        assert!(text.ends_with("\n\n"));
    }
}
