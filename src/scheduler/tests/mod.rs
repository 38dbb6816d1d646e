use super::*;
use chrono::{TimeZone, Timelike};

fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

#[test]
fn test_weekday_conversion() {
    use chrono::Weekday as ChronoWd;

    assert_eq!(Weekday::from_chrono(ChronoWd::Mon), Weekday::Monday);
    assert_eq!(Weekday::from_chrono(ChronoWd::Fri), Weekday::Friday);
    assert_eq!(Weekday::from_chrono(ChronoWd::Sun), Weekday::Sunday);
}

#[test]
fn test_next_after_same_day_before_trigger_time() {
    let trigger = DailyTrigger {
        at: at(8, 0),
        days: vec![],
    };

    let next = trigger.next_after(local(2024, 5, 1, 7, 0)).unwrap();
    assert_eq!(next.date_naive(), local(2024, 5, 1, 0, 0).date_naive());
    assert_eq!(next.hour(), 8);
}

#[test]
fn test_next_after_rolls_over_midnight() {
    let trigger = DailyTrigger {
        at: at(8, 0),
        days: vec![],
    };

    let next = trigger.next_after(local(2024, 5, 1, 9, 0)).unwrap();
    assert_eq!(next, local(2024, 5, 2, 8, 0));

    // Exactly at the trigger time is not "after"
    let next = trigger.next_after(local(2024, 5, 1, 8, 0)).unwrap();
    assert_eq!(next, local(2024, 5, 2, 8, 0));
}

#[test]
fn test_next_after_honours_weekday_filter() {
    // 2024-05-03 is a Friday
    let trigger = DailyTrigger {
        at: at(8, 0),
        days: vec![Weekday::Monday],
    };

    let next = trigger.next_after(local(2024, 5, 3, 9, 0)).unwrap();
    assert_eq!(next, local(2024, 5, 6, 8, 0));
}

#[test]
fn test_poll_fires_once_per_day() {
    let trigger = DailyTrigger {
        at: at(8, 0),
        days: vec![],
    };
    let mut scheduler = Scheduler::new(trigger, local(2024, 5, 1, 7, 0));

    assert!(!scheduler.poll(local(2024, 5, 1, 7, 59)));
    assert!(scheduler.poll(local(2024, 5, 1, 8, 0)));
    assert!(!scheduler.poll(local(2024, 5, 1, 8, 1)));
    assert!(!scheduler.poll(local(2024, 5, 1, 23, 59)));
    assert!(scheduler.poll(local(2024, 5, 2, 8, 0)));
}

#[test]
fn test_poll_after_long_sleep_fires_once() {
    let trigger = DailyTrigger {
        at: at(8, 0),
        days: vec![],
    };
    let mut scheduler = Scheduler::new(trigger, local(2024, 5, 1, 7, 0));

    // Machine suspended for three days
    assert!(scheduler.poll(local(2024, 5, 4, 12, 0)));
    assert!(!scheduler.poll(local(2024, 5, 4, 12, 1)));
    assert_eq!(scheduler.next_due(), Some(local(2024, 5, 5, 8, 0)));
}

#[test]
fn test_trigger_deserializes_short_and_long_time() {
    let short: DailyTrigger = serde_json::from_str(r#"{"at":"08:00"}"#).unwrap();
    assert_eq!(short.at, at(8, 0));
    assert!(short.days.is_empty());

    let long: DailyTrigger =
        serde_json::from_str(r#"{"at":"17:30:15","days":["Monday","Friday"]}"#).unwrap();
    assert_eq!(long.at, NaiveTime::from_hms_opt(17, 30, 15).unwrap());
    assert_eq!(long.days, vec![Weekday::Monday, Weekday::Friday]);

    let json = serde_json::to_string(&long).unwrap();
    assert!(json.contains("\"17:30:15\""));
}

#[test]
fn test_trigger_rejects_garbage_time() {
    let result: Result<DailyTrigger, _> = serde_json::from_str(r#"{"at":"eight"}"#);
    assert!(result.is_err());
}
