use chrono::{DateTime, Duration, NaiveDate, Utc};

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// 下一个 UTC 零点，毫秒时间戳
pub fn next_utc_midnight_millis(now: DateTime<Utc>) -> i64 {
    let tomorrow = now.date_naive() + Duration::days(1);
    tomorrow
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_else(|| (now + Duration::days(1)).timestamp_millis())
}

/// UTC 当天零点
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now)
}
