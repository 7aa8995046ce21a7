use anyhow::anyhow;
use clap::Parser;
use clap_derive::Parser;
use roombook::booking::timeslot::{day_to_idx, parse_hm, Slot};
use roombook::client::{Client, Reply};
use roombook::config::ClientConfig;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::Level;

/// Interactive UDP facility reservation client.
#[derive(Parser)]
struct Args {
    #[clap(default_value = "127.0.0.1")]
    host: String,

    #[clap(default_value_t = 5000)]
    port: u16,

    /// semantics tag put on requests: AMO or ALO, case-insensitive
    #[clap(default_value = "AMO")]
    semantics: String,

    /// probability in [0,1] of dropping each outbound request (0 disables loss simulation)
    #[clap(default_value_t = 0.0)]
    loss_rate: f64,

    /// seed for the loss simulator
    #[clap(default_value_t = 777)]
    seed: i64,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,
}

/// Matches the facilities the server preloads.
const FACILITIES: [&str; 3] = ["RoomA", "RoomB", "LT1"];

type InputLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let mut config = ClientConfig::new(args.host, args.port);
    config.semantics = args.semantics.parse()?;
    config.loss_rate = args.loss_rate;
    config.loss_seed = args.seed as u64;

    let mut client = Client::connect(&config).await?;
    println!(
        "Client ready. Semantics={} lossRate={}",
        config.semantics, config.loss_rate
    );
    print_facilities();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        println!();
        println!("--- Menu ---");
        println!("1) Query availability");
        println!("2) Book");
        println!("3) Change booking (shift time, keep duration)");
        println!("4) Monitor (blocking)");
        println!("5) Cancel booking (idempotent)");
        println!("6) Extend/Shorten booking (non-idempotent)");
        println!("7) Query booking");
        println!("0) Exit");

        let Some(choice) = prompt(&mut lines, "> ").await? else {
            break;
        };
        let result = match choice.trim() {
            "1" => run_query(&mut client, &mut lines).await,
            "2" => run_book(&mut client, &mut lines).await,
            "3" => run_change(&mut client, &mut lines).await,
            "4" => run_monitor(&mut client, &mut lines).await,
            "5" => run_cancel(&mut client, &mut lines).await,
            "6" => run_extend(&mut client, &mut lines).await,
            "7" => run_query_booking(&mut client, &mut lines).await,
            "0" => {
                println!("Bye.");
                break;
            }
            _ => {
                println!("Invalid choice.");
                Ok(())
            }
        };
        if let Err(e) = result {
            println!("ERROR: {}", e);
        }
    }
    Ok(())
}

async fn run_query(client: &mut Client, lines: &mut InputLines) -> anyhow::Result<()> {
    print_facilities();
    let facility = require(prompt(lines, "Facility: ").await?)?;
    let days = require(prompt(lines, "Days (e.g., Mon,Tue): ").await?)?;
    show_reply(&client.query(&facility, &days).await?);
    Ok(())
}

async fn run_book(client: &mut Client, lines: &mut InputLines) -> anyhow::Result<()> {
    print_facilities();
    let facility = require(prompt(lines, "Facility: ").await?)?;
    let start = require(prompt(lines, "Start (e.g., Mon@09:00): ").await?)?;
    let end = require(prompt(lines, "End   (e.g., Mon@10:30): ").await?)?;

    let (start_day, start_hm) = split_day_time(&start)?;
    let (_, end_hm) = split_day_time(&end)?;
    let slot = Slot::new(day_to_idx(start_day)?, parse_hm(start_hm)?, parse_hm(end_hm)?)?;

    show_reply(&client.book(&facility, slot).await?);
    Ok(())
}

async fn run_change(client: &mut Client, lines: &mut InputLines) -> anyhow::Result<()> {
    let id = parse_id(&require(prompt(lines, "Confirmation ID (code or full string): ").await?)?)?;
    let shift = require(prompt(lines, "Shift time (minutes, +forward / -backward, e.g., +60 or -30): ").await?)?;
    let shift_min: i32 = parse_signed(&shift)?;
    show_reply(&client.change(id, shift_min).await?);
    Ok(())
}

async fn run_monitor(client: &mut Client, lines: &mut InputLines) -> anyhow::Result<()> {
    print_facilities();
    let facility = require(prompt(lines, "Facility: ").await?)?;
    let seconds: i32 = require(prompt(lines, "Monitor seconds: ").await?)?.trim().parse()?;

    println!("Waiting for updates (Ctrl+C to quit client if needed)...");
    let reply = client
        .monitor(&facility, seconds, |facility, text| {
            println!();
            println!("[UPDATE] {}", facility);
            println!("{}", text);
        })
        .await?;
    show_reply(&reply);
    if !reply.error {
        println!("Monitor interval finished.");
    }
    Ok(())
}

async fn run_cancel(client: &mut Client, lines: &mut InputLines) -> anyhow::Result<()> {
    let id = parse_id(&require(prompt(lines, "Confirmation ID (code or full string): ").await?)?)?;
    show_reply(&client.cancel(id).await?);
    Ok(())
}

async fn run_extend(client: &mut Client, lines: &mut InputLines) -> anyhow::Result<()> {
    let id = parse_id(&require(prompt(lines, "Confirmation ID (code or full string): ").await?)?)?;
    println!("Adjust start/end time (non-idempotent):");
    let start_delta = parse_signed(&require(
        prompt(lines, "Start delta (min, +later/-earlier, e.g. +30 or -15): ").await?,
    )?)?;
    let end_delta = parse_signed(&require(
        prompt(lines, "End delta (min, +extend/-shorten, e.g. +60 or -30): ").await?,
    )?)?;
    show_reply(&client.extend(id, start_delta, end_delta).await?);
    Ok(())
}

async fn run_query_booking(client: &mut Client, lines: &mut InputLines) -> anyhow::Result<()> {
    let id = parse_id(&require(prompt(lines, "Confirmation ID (code or full string): ").await?)?)?;
    show_reply(&client.query_booking(id).await?);
    Ok(())
}

async fn prompt(lines: &mut InputLines, text: &str) -> anyhow::Result<Option<String>> {
    use std::io::Write;
    print!("{}", text);
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?)
}

fn require(line: Option<String>) -> anyhow::Result<String> {
    line.ok_or_else(|| anyhow!("end of input"))
}

fn print_facilities() {
    println!("Available facilities (server-preloaded): {}", FACILITIES.join(", "));
}

/// "Mon@09:00" -> ("Mon", "09:00")
fn split_day_time(s: &str) -> anyhow::Result<(&str, &str)> {
    s.trim()
        .split_once('@')
        .ok_or_else(|| anyhow!("expected Day@HH:MM, got {:?}", s.trim()))
}

/// Accepts an explicit leading '+' the way the prompts suggest entering deltas.
fn parse_signed(s: &str) -> anyhow::Result<i32> {
    let s = s.trim();
    Ok(s.strip_prefix('+').unwrap_or(s).parse()?)
}

/// Accepts a bare confirmation code or a pasted reply line like "CONFIRM# 1234".
fn parse_id(input: &str) -> anyhow::Result<i64> {
    let mut s = input.trim();
    for tag in ["CONFIRM#", "CHANGED#", "CANCELED#", "EXTENDED#"] {
        if let Some(rest) = s.strip_prefix(tag) {
            s = rest.trim_start();
            break;
        }
    }
    let first = s.split_whitespace().next().unwrap_or("");
    let digits: String = first.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(anyhow!("no confirmation id digits in {:?}", input));
    }
    Ok(digits.parse()?)
}

/// Error replies render with an ERROR: prefix; confirmation replies get their code pulled out
/// so it is easy to copy. Everything else prints as-is.
fn show_reply(reply: &Reply) {
    if reply.error {
        println!("ERROR: {}", reply.text);
        return;
    }
    let text = reply.text.trim();
    if let Some((tag, rest)) = text.split_once('#') {
        let is_confirmation = matches!(tag, "CONFIRM" | "CHANGED" | "CANCELED" | "EXTENDED")
            && rest.trim_start().starts_with(|c: char| c.is_ascii_digit());
        if is_confirmation {
            println!("Result: {}", tag);
            if let Ok(code) = parse_id(text) {
                println!("Code  : {}  (<- save this code)", code);
            }
            return;
        }
    }
    println!("{}", text);
}
