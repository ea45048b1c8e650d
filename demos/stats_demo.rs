use clap::Parser;
use robin_hash::Elem;
use robin_hash::HashTable;
use robin_hash::hasher::HashFn;
use robin_hash::hasher::fnv1a_mix;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    #[arg(short = 's', long = "seed", default_value_t = 0x5eed)]
    seed: u64,

    /// Fraction of the inserted keys to remove again before printing.
    #[arg(short = 'r', long = "remove_fraction", default_value_t = 0.0)]
    remove_fraction: f64,

    /// Hash keys with foldhash instead of the built-in mixer.
    #[cfg(feature = "foldhash")]
    #[arg(long = "foldhash")]
    foldhash: bool,
}

#[cfg(feature = "foldhash")]
fn select_hasher(args: &Args) -> HashFn {
    if args.foldhash {
        robin_hash::hasher::foldhash
    } else {
        fnv1a_mix
    }
}

#[cfg(not(feature = "foldhash"))]
fn select_hasher(_args: &Args) -> HashFn {
    fnv1a_mix
}

fn main() -> Result<(), robin_hash::Error> {
    let args = Args::parse();

    let hasher = select_hasher(&args);

    println!(
        "Creating HashTable with target capacity: {}",
        args.target_capacity
    );

    let mut table =
        HashTable::with_capacity(args.target_capacity, 8, 8, args.seed, Some(hasher), None)?;

    println!(
        "Actual capacity: {} (resize threshold {})",
        table.capacity(),
        table.threshold()
    );
    println!("Filling table with u64 keys...");

    let num_values = table.threshold() as u64;
    for i in 0..num_values {
        table.set(
            Some(Elem::from(&i.to_le_bytes())),
            Some(Elem::from(&(i * i).to_le_bytes())),
        )?;
    }

    let num_removals = (num_values as f64 * args.remove_fraction.clamp(0.0, 1.0)) as u64;
    for i in 0..num_removals {
        table.remove(Some(Elem::from(&i.to_le_bytes())));
    }

    println!(
        "Inserted {} values, removed {}, table holds {}",
        num_values,
        num_removals,
        table.len()
    );
    println!(
        "Final load factor: {:.2}%",
        (table.len() as f64 / table.capacity() as f64) * 100.0
    );

    table.print_probe_histogram();
    table.debug_stats().print();

    Ok(())
}
