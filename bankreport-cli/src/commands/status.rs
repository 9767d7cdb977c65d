//! Status command - store counts and known bankers

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.get_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "bankreport status".bold());
    println!();

    let counts = &status.counts;
    let mut table = output::create_table();
    table.add_row(vec!["Branches", &counts.branches.to_string()]);
    table.add_row(vec!["Products", &counts.products.to_string()]);
    table.add_row(vec!["Bankers", &counts.bankers.to_string()]);
    table.add_row(vec!["Clients", &counts.clients.to_string()]);
    table.add_row(vec!["Accounts", &counts.accounts.to_string()]);
    table.add_row(vec!["Balance records", &counts.balance_records.to_string()]);
    table.add_row(vec!["Jobs in cache", &counts.cached_jobs.to_string()]);
    println!("{}", table);
    println!();

    match counts.latest_report_date {
        Some(date) => println!("Latest report date: {}", date),
        None => println!("No balances imported yet."),
    }
    println!("Data directory: {}", ctx.data_dir.display());

    if !status.bankers.is_empty() {
        println!();
        println!("{}", "Bankers".bold());
        let mut table = output::create_table();
        table.set_header(vec!["ID", "Code", "Name"]);
        for banker in &status.bankers {
            table.add_row(vec![banker.id.to_string(), banker.code.clone(), banker.name.clone()]);
        }
        println!("{}", table);
    }

    Ok(())
}
