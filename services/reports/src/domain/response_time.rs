/// Response-time pairing for outbound texts and inbound replies
///
/// Walks a list of message events sorted by `(group_key, sent_date)` once,
/// pairing each inbound reply with the outbound message that immediately
/// precedes it in the same group, and averages the elapsed seconds.
use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;

/// Pairs at or above this many seconds are not counted as a response
pub const MAX_RESPONSE_SECONDS: i64 = 86_400;

/// `generated_from` value of messages sent through the communicator
const OUTBOUND_GENERATED_FROM: &str = "Comunicator";
/// `type` value of outbound messages that actually went out
const OUTBOUND_TYPE: &str = "Not-Pending";
/// `generated_from` and `type` value of customer replies
const INBOUND_MARKER: &str = "Reply";

/// Direction of a message event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
    /// Anything else (system notices, pending messages, e-mails)
    Other,
}

impl Direction {
    /// Infers the direction from the event's `generated_from` and `type` columns
    pub fn classify(generated_from: &str, event_type: &str) -> Self {
        match (generated_from, event_type) {
            (OUTBOUND_GENERATED_FROM, OUTBOUND_TYPE) => Direction::Outbound,
            (INBOUND_MARKER, INBOUND_MARKER) => Direction::Inbound,
            _ => Direction::Other,
        }
    }
}

/// What the events are grouped by before pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    RepairOrder,
    Recipient,
}

/// How the valid pairs are averaged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// One average per group key
    PerGroup,
    /// One average across every group
    Single,
}

/// One communication event
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub group_key: String,
    pub sent_date: NaiveDateTime,
    pub direction: Direction,
    pub has_attachment: bool,
}

impl MessageEvent {
    pub fn new(
        group_key: impl Into<String>,
        sent_date: NaiveDateTime,
        direction: Direction,
        has_attachment: bool,
    ) -> Self {
        Self {
            group_key: group_key.into(),
            sent_date,
            direction,
            has_attachment,
        }
    }
}

/// An outbound event and the reply that answered it
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePair<'a> {
    pub outbound: &'a MessageEvent,
    pub inbound: &'a MessageEvent,
    pub elapsed_seconds: i64,
}

/// Average response times produced by [`ResponseTimePairer::average`]
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseTimes {
    /// Group key to average seconds; groups without a valid pair are absent
    PerGroup(BTreeMap<String, f64>),
    /// Average across all valid pairs; `None` when there were none
    Single(Option<f64>),
}

/// Pairs outbound messages with replies and averages the latency
#[derive(Debug, Clone, Copy)]
pub struct ResponseTimePairer {
    max_elapsed_seconds: i64,
}

impl Default for ResponseTimePairer {
    fn default() -> Self {
        Self {
            max_elapsed_seconds: MAX_RESPONSE_SECONDS,
        }
    }
}

impl ResponseTimePairer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every valid pair in scan order.
    ///
    /// `events` must already be sorted by `(group_key, sent_date)`; the order
    /// is not re-checked. A reply pairs only when the event right before it
    /// is the pending outbound of the same group and carried an attachment.
    pub fn pairs<'a>(&self, events: &'a [MessageEvent]) -> Vec<ResponsePair<'a>> {
        let mut pending: HashMap<&'a str, &'a MessageEvent> = HashMap::new();
        let mut previous: Option<&'a MessageEvent> = None;
        let mut pairs = Vec::new();

        for event in events {
            match event.direction {
                Direction::Outbound => {
                    pending.insert(event.group_key.as_str(), event);
                }
                Direction::Inbound => {
                    if let Some(outbound) = pending.get(event.group_key.as_str()).copied() {
                        let adjacent = previous.is_some_and(|prev| std::ptr::eq(prev, outbound));

                        if adjacent && outbound.has_attachment {
                            pending.remove(event.group_key.as_str());

                            let elapsed_seconds =
                                (event.sent_date - outbound.sent_date).num_seconds();
                            if elapsed_seconds < self.max_elapsed_seconds {
                                pairs.push(ResponsePair {
                                    outbound,
                                    inbound: event,
                                    elapsed_seconds,
                                });
                            }
                        }
                    }
                }
                Direction::Other => {}
            }

            previous = Some(event);
        }

        pairs
    }

    /// Averages valid pairs per group key
    pub fn average_per_group(&self, events: &[MessageEvent]) -> BTreeMap<String, f64> {
        let mut elapsed: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for pair in self.pairs(events) {
            elapsed
                .entry(pair.inbound.group_key.clone())
                .or_default()
                .push(pair.elapsed_seconds);
        }

        elapsed
            .into_iter()
            .filter_map(|(group, values)| mean(&values).map(|avg| (group, avg)))
            .collect()
    }

    /// Averages every valid pair regardless of group
    pub fn average_overall(&self, events: &[MessageEvent]) -> Option<f64> {
        let elapsed: Vec<i64> = self
            .pairs(events)
            .iter()
            .map(|pair| pair.elapsed_seconds)
            .collect();
        mean(&elapsed)
    }

    pub fn average(&self, events: &[MessageEvent], aggregation: Aggregation) -> ResponseTimes {
        match aggregation {
            Aggregation::PerGroup => ResponseTimes::PerGroup(self.average_per_group(events)),
            Aggregation::Single => ResponseTimes::Single(self.average_overall(events)),
        }
    }
}

fn mean(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: i64 = values.iter().sum();
    Some(sum as f64 / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn t(offset_seconds: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 5, 18)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            + Duration::seconds(offset_seconds)
    }

    fn outbound(group: &str, at: i64) -> MessageEvent {
        MessageEvent::new(group, t(at), Direction::Outbound, true)
    }

    fn inbound(group: &str, at: i64) -> MessageEvent {
        MessageEvent::new(group, t(at), Direction::Inbound, false)
    }

    #[test]
    fn test_classify_direction() {
        assert_eq!(Direction::classify("Comunicator", "Not-Pending"), Direction::Outbound);
        assert_eq!(Direction::classify("Reply", "Reply"), Direction::Inbound);
        assert_eq!(Direction::classify("System", "Not-Pending"), Direction::Other);
        assert_eq!(Direction::classify("Comunicator", "Pending"), Direction::Other);
        assert_eq!(Direction::classify("Reply", "Sent"), Direction::Other);
    }

    #[test]
    fn test_single_pair_average() {
        let events = vec![outbound("RO1", 0), inbound("RO1", 300)];

        let averages = ResponseTimePairer::new().average_per_group(&events);

        assert_eq!(averages.get("RO1"), Some(&300.0));
    }

    #[test]
    fn test_overflow_pair_does_not_count() {
        let events = vec![
            outbound("RO1", 0),
            inbound("RO1", 300),
            outbound("RO1", 400),
            inbound("RO1", 90_000),
        ];

        let averages = ResponseTimePairer::new().average_per_group(&events);

        assert_eq!(averages.len(), 1);
        assert_eq!(averages.get("RO1"), Some(&300.0));
    }

    #[test]
    fn test_threshold_boundary() {
        let pairer = ResponseTimePairer::new();

        let at_limit = vec![outbound("RO1", 0), inbound("RO1", 86_400)];
        assert!(pairer.pairs(&at_limit).is_empty());

        let below_limit = vec![outbound("RO1", 0), inbound("RO1", 86_399)];
        let pairs = pairer.pairs(&below_limit);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].elapsed_seconds, 86_399);
    }

    #[test]
    fn test_non_adjacent_reply_is_not_paired() {
        let events = vec![
            outbound("RO1", 0),
            MessageEvent::new("RO1", t(60), Direction::Other, false),
            inbound("RO1", 120),
        ];

        assert!(ResponseTimePairer::new().pairs(&events).is_empty());
    }

    #[test]
    fn test_reply_after_another_groups_outbound_is_not_paired() {
        // RO1の送信の直後がRO2の送信なので、RO1の返信は隣接していない
        let events = vec![outbound("RO1", 0), outbound("RO2", 10), inbound("RO1", 20)];

        assert!(ResponseTimePairer::new().pairs(&events).is_empty());
    }

    #[test]
    fn test_outbound_without_attachment_is_not_paired() {
        let events = vec![
            MessageEvent::new("RO1", t(0), Direction::Outbound, false),
            inbound("RO1", 30),
        ];

        assert!(ResponseTimePairer::new().pairs(&events).is_empty());
    }

    #[test]
    fn test_latest_outbound_wins() {
        let events = vec![outbound("RO1", 0), outbound("RO1", 100), inbound("RO1", 160)];

        let pairs = ResponseTimePairer::new().pairs(&events);

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].elapsed_seconds, 60);
    }

    #[test]
    fn test_second_reply_does_not_reuse_outbound() {
        let events = vec![outbound("RO1", 0), inbound("RO1", 50), inbound("RO1", 70)];

        let pairs = ResponseTimePairer::new().pairs(&events);

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].elapsed_seconds, 50);
    }

    #[test]
    fn test_per_group_averages() {
        let events = vec![
            outbound("RO1", 0),
            inbound("RO1", 100),
            outbound("RO1", 200),
            inbound("RO1", 500),
            outbound("RO2", 0),
            inbound("RO2", 40),
            outbound("RO3", 0),
        ];

        let averages = ResponseTimePairer::new().average_per_group(&events);

        assert_eq!(averages.get("RO1"), Some(&200.0));
        assert_eq!(averages.get("RO2"), Some(&40.0));
        assert_eq!(averages.get("RO3"), None);
    }

    #[test]
    fn test_single_aggregate_across_groups() {
        let events = vec![
            outbound("recipient-a", 0),
            inbound("recipient-a", 100),
            outbound("recipient-b", 0),
            inbound("recipient-b", 300),
        ];

        let pairer = ResponseTimePairer::new();

        assert_eq!(pairer.average_overall(&events), Some(200.0));
        assert_eq!(
            pairer.average(&events, Aggregation::Single),
            ResponseTimes::Single(Some(200.0))
        );
    }

    #[test]
    fn test_empty_input() {
        let pairer = ResponseTimePairer::new();

        assert_eq!(
            pairer.average(&[], Aggregation::PerGroup),
            ResponseTimes::PerGroup(BTreeMap::new())
        );
        assert_eq!(pairer.average(&[], Aggregation::Single), ResponseTimes::Single(None));
    }

    #[test]
    fn test_only_unmatched_events_yield_no_value() {
        let events = vec![inbound("RO1", 0), outbound("RO1", 10)];

        assert_eq!(ResponseTimePairer::new().average_overall(&events), None);
    }
}
