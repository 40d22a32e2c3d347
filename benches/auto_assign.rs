use std::time::{Duration, Instant};

use eventdesk::engine::auto_assign::{plan, Demand, Supply};
use eventdesk::model::Strategy;

const ROUNDS: usize = 20;

/// Deterministic xorshift so runs are comparable.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn workload(bookings: usize, timeslots: u32, seed: u64) -> (Vec<Demand>, Vec<Supply>) {
    let mut rng = Rng(seed);
    let supply = (0..timeslots)
        .map(|timeslot_id| Supply {
            timeslot_id,
            capacity: 1 + rng.below(8) as u32,
        })
        .collect();
    let demands = (0..bookings)
        .map(|i| {
            let mut preferences = [None; 3];
            for slot in preferences.iter_mut() {
                // roughly one in five preferences left blank
                if rng.below(5) != 0 {
                    *slot = Some(rng.below(u64::from(timeslots)) as u32);
                }
            }
            Demand {
                booking_id: i as u64 + 1,
                amount_shifts: rng.below(4) as u8,
                preferences,
            }
        })
        .collect();
    (demands, supply)
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        latencies.last().copied().unwrap_or_default().as_secs_f64() * 1000.0,
    );
}

fn main() {
    println!("auto-assign planner");
    for (bookings, timeslots) in [(500, 40), (5_000, 200), (20_000, 600)] {
        let (demands, supply) = workload(bookings, timeslots, 0x9e37_79b9_7f4a_7c15);
        println!("\n{bookings} bookings, {timeslots} timeslots");
        for strategy in [Strategy::Priority, Strategy::Fill] {
            let mut latencies = Vec::with_capacity(ROUNDS);
            let mut made = 0;
            for _ in 0..ROUNDS {
                let start = Instant::now();
                let result = plan(strategy, &demands, &supply);
                latencies.push(start.elapsed());
                made = result.stats.assignments_made;
            }
            print_latency(&format!("{} ({made} assignments)", strategy.as_str()), &mut latencies);
        }
    }
}
