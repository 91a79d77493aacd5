//! Holiday calendars

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Decides whether a date is a holiday
pub trait HolidayCalendar {
    /// True if `date` is a holiday (or an observed holiday) in its own year
    fn is_holiday(&self, date: NaiveDate) -> bool;
}

/// United States federal holidays with weekend observance shifts
///
/// Saturday holidays are observed on the preceding Friday and Sunday
/// holidays on the following Monday; both the actual and the observed
/// date count as holidays.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsFederalHolidays;

impl UsFederalHolidays {
    pub fn new() -> Self {
        Self
    }

    /// All holiday dates (actual and observed) falling inside `year`
    pub fn holidays_in_year(&self, year: i32) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = (year - 1..=year + 1)
            .flat_map(fixed_and_floating)
            .flat_map(|d| [d, observed(d)])
            .filter(|d| d.year() == year)
            .collect();
        dates.sort();
        dates.dedup();
        dates
    }
}

impl HolidayCalendar for UsFederalHolidays {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays_in_year(date.year()).binary_search(&date).is_ok()
    }
}

fn fixed_and_floating(year: i32) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(11);
    days.extend(ymd(year, 1, 1));
    if year >= 1986 {
        days.extend(nth_weekday(year, 1, Weekday::Mon, 3));
    }
    days.extend(nth_weekday(year, 2, Weekday::Mon, 3));
    days.extend(last_weekday(year, 5, Weekday::Mon));
    if year >= 2021 {
        days.extend(ymd(year, 6, 19));
    }
    days.extend(ymd(year, 7, 4));
    days.extend(nth_weekday(year, 9, Weekday::Mon, 1));
    days.extend(nth_weekday(year, 10, Weekday::Mon, 2));
    days.extend(ymd(year, 11, 11));
    days.extend(nth_weekday(year, 11, Weekday::Thu, 4));
    days.extend(ymd(year, 12, 25));
    days
}

fn ymd(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    nth_weekday(year, month, weekday, 5).or_else(|| nth_weekday(year, month, weekday, 4))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_fixed_holidays() {
        let cal = UsFederalHolidays::new();
        assert!(cal.is_holiday(d(2024, 7, 4)));
        assert!(cal.is_holiday(d(2024, 12, 25)));
        assert!(!cal.is_holiday(d(2024, 7, 5)));
    }

    #[test]
    fn test_floating_holidays_2024() {
        let cal = UsFederalHolidays::new();
        assert!(cal.is_holiday(d(2024, 1, 15))); // MLK day
        assert!(cal.is_holiday(d(2024, 5, 27))); // Memorial day
        assert!(cal.is_holiday(d(2024, 9, 2))); // Labor day
        assert!(cal.is_holiday(d(2024, 11, 28))); // Thanksgiving
    }

    #[test]
    fn test_observed_shifts() {
        let cal = UsFederalHolidays::new();
        // 2021-07-04 was a Sunday
        assert!(cal.is_holiday(d(2021, 7, 5)));
        // 2022-01-01 was a Saturday, observed 2021-12-31
        assert!(cal.is_holiday(d(2021, 12, 31)));
    }

    #[test]
    fn test_juneteenth_only_from_2021() {
        let cal = UsFederalHolidays::new();
        assert!(!cal.is_holiday(d(2019, 6, 19)));
        assert!(cal.is_holiday(d(2023, 6, 19)));
    }
}
