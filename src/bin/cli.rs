//! OptiKV CLI Client
//!
//! Command-line interface for interacting with OptiKV.
//!
//! With `--perf`, every operation also reports how long the server spent
//! processing the request, measured between the server's own marks.

use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use optikv::{Client, CounterKind, Mark, OptiError, RejectRules, Result};

/// Table used by the smoke workload
const SMOKE_TABLE: &str = "smoke";

/// Objects inserted by the smoke workload's bulk phase
const BULK_OBJECTS: usize = 1000;

/// OptiKV CLI
#[derive(Parser, Debug)]
#[command(name = "optikv-cli")]
#[command(about = "CLI for the OptiKV table-structured key-value store")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    server: String,

    /// Report server-side processing time per operation
    #[arg(short, long)]
    perf: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a table
    CreateTable {
        /// Table name
        name: String,
    },

    /// Look up a table's id
    OpenTable {
        /// Table name
        name: String,
    },

    /// Drop a table and all of its objects
    DropTable {
        /// Table name
        name: String,
    },

    /// Read an object
    Read {
        /// Table name
        table: String,

        /// Object key
        key: u64,
    },

    /// Write an object at an explicit key
    Write {
        /// Table name
        table: String,

        /// Object key
        key: u64,

        /// Value to store
        value: String,

        /// Only write if the stored version matches
        #[arg(long)]
        expect_version: Option<u64>,
    },

    /// Insert an object at a server-chosen key
    Insert {
        /// Table name
        table: String,

        /// Value to store
        value: String,
    },

    /// Ping the server
    Ping,

    /// Run a short scripted workload against the server
    Smoke,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut client = Client::connect_addr(&args.server)?;

    if args.perf {
        client.select_perf_counter(
            CounterKind::Ticks,
            Mark::RpcProcessingBegin,
            Mark::RpcProcessingEnd,
        );
    }

    let is_smoke = matches!(args.command, Commands::Smoke);

    match args.command {
        Commands::CreateTable { name } => {
            client.create_table(&name)?;
            println!("created table '{}'", name);
        }
        Commands::OpenTable { name } => {
            let table_id = client.open_table(&name)?;
            println!("table id: {}", table_id);
        }
        Commands::DropTable { name } => {
            client.drop_table(&name)?;
            println!("dropped table '{}'", name);
        }
        Commands::Read { table, key } => {
            let table_id = client.open_table(&table)?;
            let (value, version) = client.read(table_id, key, RejectRules::none())?;
            println!("{}", String::from_utf8_lossy(&value));
            println!("version: {}", version);
        }
        Commands::Write {
            table,
            key,
            value,
            expect_version,
        } => {
            let table_id = client.open_table(&table)?;
            let rules = match expect_version {
                Some(version) => RejectRules::version_equals(version),
                None => RejectRules::none(),
            };
            let version = client.write(table_id, key, rules, value.as_bytes())?;
            println!("version: {}", version);
        }
        Commands::Insert { table, value } => {
            let table_id = client.open_table(&table)?;
            let (key, version) = client.insert(table_id, value.as_bytes())?;
            println!("key: {}", key);
            println!("version: {}", version);
        }
        Commands::Ping => {
            client.ping()?;
            println!("PONG");
        }
        Commands::Smoke => {
            smoke(&mut client, args.perf)?;
        }
    }

    if args.perf && !is_smoke {
        println!("server processing: {} ns", client.read_perf_counter());
    }

    client.disconnect();
    Ok(())
}

/// Scripted workload exercising every operation once, with timings
fn smoke(client: &mut Client, perf: bool) -> Result<()> {
    println!("smoke workload against {}", client.server_addr());

    let started = Instant::now();
    client.ping()?;
    let elapsed = started.elapsed();
    print_step("ping", elapsed, counter(client, perf));

    // A table left over from an interrupted run is fine; reuse it.
    let started = Instant::now();
    match client.create_table(SMOKE_TABLE) {
        Ok(()) => {
            let elapsed = started.elapsed();
            print_step("create table", elapsed, counter(client, perf));
        }
        Err(OptiError::TableExists) => {
            println!("{:<24} already exists, reusing", "create table");
        }
        Err(e) => return Err(e),
    }

    let started = Instant::now();
    let table_id = client.open_table(SMOKE_TABLE)?;
    let elapsed = started.elapsed();
    print_step("open table", elapsed, counter(client, perf));
    println!("  table id: {}", table_id);

    let started = Instant::now();
    let version = client.write(table_id, 42, RejectRules::none(), b"Hello, World!")?;
    let elapsed = started.elapsed();
    print_step("write key 42", elapsed, counter(client, perf));
    println!("  version: {}", version);

    let started = Instant::now();
    let version = client.write(table_id, 43, RejectRules::none(), b"second object")?;
    let elapsed = started.elapsed();
    print_step("write key 43", elapsed, counter(client, perf));
    println!("  version: {}", version);

    let started = Instant::now();
    let (value, version) = client.read(table_id, 42, RejectRules::none())?;
    let elapsed = started.elapsed();
    print_step("read key 42", elapsed, counter(client, perf));
    println!("  '{}' at version {}", String::from_utf8_lossy(&value), version);

    // Guarded overwrite, then the same stale guard again to show a rejection
    let started = Instant::now();
    let new_version = client.write(
        table_id,
        42,
        RejectRules::version_equals(version),
        b"Hello again",
    )?;
    let elapsed = started.elapsed();
    print_step("guarded write", elapsed, counter(client, perf));
    println!("  version {} -> {}", version, new_version);

    let started = Instant::now();
    match client.write(table_id, 42, RejectRules::version_equals(version), b"stale") {
        Err(OptiError::Rejected { current_version }) => {
            let elapsed = started.elapsed();
            print_step("stale guarded write", elapsed, counter(client, perf));
            match current_version {
                Some(current) => println!("  rejected, current version {}", current),
                None => println!("  rejected, object missing"),
            }
        }
        Ok(version) => println!("  unexpectedly succeeded at version {}", version),
        Err(e) => return Err(e),
    }

    let started = Instant::now();
    let (key, version) = client.insert(table_id, b"inserted object")?;
    let elapsed = started.elapsed();
    print_step("insert", elapsed, counter(client, perf));
    println!("  key {} at version {}", key, version);

    // Bulk inserts for a rough throughput number
    let started = Instant::now();
    for i in 0..BULK_OBJECTS {
        let value = format!("bulk object {}", i);
        client.insert(table_id, value.as_bytes())?;
    }
    let elapsed = started.elapsed();
    println!(
        "{:<24} {} objects in {:.1} ms ({:.1} us/op)",
        "bulk insert",
        BULK_OBJECTS,
        elapsed.as_secs_f64() * 1e3,
        elapsed.as_secs_f64() * 1e6 / BULK_OBJECTS as f64
    );

    let started = Instant::now();
    client.drop_table(SMOKE_TABLE)?;
    let elapsed = started.elapsed();
    print_step("drop table", elapsed, counter(client, perf));

    Ok(())
}

fn counter(client: &Client, perf: bool) -> Option<u32> {
    perf.then(|| client.read_perf_counter())
}

fn print_step(label: &str, elapsed: Duration, server_ns: Option<u32>) {
    match server_ns {
        Some(ns) => println!(
            "{:<24} client {:>9.1} us   server {:>8} ns",
            label,
            elapsed.as_secs_f64() * 1e6,
            ns
        ),
        None => println!(
            "{:<24} client {:>9.1} us",
            label,
            elapsed.as_secs_f64() * 1e6
        ),
    }
}
