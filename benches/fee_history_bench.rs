//! 费用历史窗口基准测试
//!
//! 测试场景:
//! 1. 不同窗口大小下的追加 + 按列中位数
//! 2. 单列中位数
//! 3. 兑换最小到账数量计算

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ethers::types::U256;
use rust_decimal::Decimal;
use walletcore::{
    fee::history::{median, FeeHistoryWindow, FeeRow},
    service::swap::calculate_minimum_return_amount,
};

const WINDOW_SIZES: &[usize] = &[4, 20, 100];

fn sample_row(i: u64) -> FeeRow {
    [
        Decimal::new((i % 17) as i64 * 13, 3),
        Decimal::new((i % 23) as i64 * 29, 3),
        Decimal::new((i % 31) as i64 * 41, 3),
    ]
}

fn bench_window_push_and_medians(c: &mut Criterion) {
    let mut group = c.benchmark_group("fee_history_window");

    for &size in WINDOW_SIZES {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut window = FeeHistoryWindow::new(size);
            window.extend((0..size as u64).map(sample_row));
            let mut block = size as u64;

            b.iter(|| {
                block += 1;
                window.push(sample_row(block));
                black_box(window.medians())
            });
        });
    }

    group.finish();
}

fn bench_median(c: &mut Criterion) {
    let values: Vec<Decimal> = (0..101).map(|i| Decimal::new(i * 7 % 101, 2)).collect();
    c.bench_function("median_101", |b| b.iter(|| black_box(median(black_box(&values)))));
}

fn bench_minimum_return(c: &mut Criterion) {
    let amount = U256::from_dec_str("123456789012345678901234567890").unwrap_or_default();
    let slippage = Decimal::new(35, 2);
    c.bench_function("minimum_return_amount", |b| {
        b.iter(|| calculate_minimum_return_amount(black_box(amount), black_box(slippage)))
    });
}

criterion_group!(
    benches,
    bench_window_push_and_medians,
    bench_median,
    bench_minimum_return
);
criterion_main!(benches);
