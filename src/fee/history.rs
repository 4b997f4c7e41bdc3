//! 优先费历史窗口
//!
//! 固定容量的环形缓冲，每行是一个区块在 {low, medium, high} 三个百分位上的
//! 奖励值（gwei）。超过容量时丢弃最旧的一行，按列取中位数得到三档优先费。

use std::collections::VecDeque;

use rust_decimal::{Decimal, RoundingStrategy};

/// 每行的列数，对应 low / medium / high
pub const TIER_COUNT: usize = 3;

pub type FeeRow = [Decimal; TIER_COUNT];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeHistoryWindow {
    rows: VecDeque<FeeRow>,
    capacity: usize,
}

impl FeeHistoryWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            rows: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 追加一行，每个值先四舍五入到 2 位小数
    pub fn push(&mut self, row: FeeRow) {
        if self.rows.len() == self.capacity {
            self.rows.pop_front();
        }
        let rounded =
            row.map(|value| value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero));
        self.rows.push_back(rounded);
    }

    pub fn extend<I: IntoIterator<Item = FeeRow>>(&mut self, rows: I) {
        for row in rows {
            self.push(row);
        }
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn rows(&self) -> impl Iterator<Item = &FeeRow> {
        self.rows.iter()
    }

    pub fn column(&self, index: usize) -> Vec<Decimal> {
        self.rows.iter().map(|row| row[index]).collect()
    }

    /// 三列各自的中位数；窗口为空时返回 None
    pub fn medians(&self) -> Option<FeeRow> {
        if self.rows.is_empty() {
            return None;
        }
        let mut out = [Decimal::ZERO; TIER_COUNT];
        for (index, slot) in out.iter_mut().enumerate() {
            *slot = median(&self.column(index))?;
        }
        Some(out)
    }
}

/// 中位数；偶数个元素取中间两个的平均值
pub fn median(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / Decimal::from(2))
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn test_window_evicts_oldest_row() {
        let mut window = FeeHistoryWindow::new(2);
        window.push([dec("1"), dec("2"), dec("3")]);
        window.push([dec("4"), dec("5"), dec("6")]);
        window.push([dec("7"), dec("8"), dec("9")]);

        assert_eq!(window.len(), 2);
        assert_eq!(window.column(0), vec![dec("4"), dec("7")]);
    }

    #[test]
    fn test_values_rounded_to_two_places() {
        let mut window = FeeHistoryWindow::new(4);
        window.push([dec("1.234"), dec("1.235"), dec("0.001")]);
        let row = *window.rows().next().unwrap();
        assert_eq!(row, [dec("1.23"), dec("1.24"), dec("0.00")]);
    }

    #[test]
    fn test_column_medians() {
        let mut window = FeeHistoryWindow::new(4);
        window.extend([
            [dec("1"), dec("10"), dec("100")],
            [dec("3"), dec("30"), dec("300")],
            [dec("2"), dec("20"), dec("200")],
        ]);
        assert_eq!(window.medians(), Some([dec("2"), dec("20"), dec("200")]));

        window.push([dec("4"), dec("40"), dec("400")]);
        assert_eq!(window.medians(), Some([dec("2.5"), dec("25"), dec("250")]));
    }

    #[test]
    fn test_empty_window_has_no_medians() {
        let window = FeeHistoryWindow::new(0);
        assert_eq!(window.capacity(), 1);
        assert!(window.medians().is_none());
        assert!(median(&[]).is_none());
    }
}
