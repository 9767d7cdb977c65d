//! New command - seed reference records
//!
//! Record management lives in another application; these commands exist so
//! a fresh store can be populated for imports.

use anyhow::{anyhow, Result};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Input;
use rust_decimal::Decimal;
use serde::Serialize;

use super::get_context;
use bankreport_core::ports::Repository;
use bankreport_core::Account;

#[derive(Subcommand)]
pub enum NewCommands {
    /// Add a branch
    Branch {
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Add an account product
    Product {
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Add a universal banker (relationship officer)
    Banker {
        /// Personnel code as it appears in spreadsheets
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        branch_id: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    /// Add a client
    Client {
        #[arg(long)]
        cif: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Add an account for an existing client
    Account {
        /// Account number; separators are stripped
        #[arg(long)]
        number: Option<String>,
        /// CIF of the owning client
        #[arg(long)]
        cif: Option<String>,
        /// Code of the managing banker
        #[arg(long)]
        banker: Option<String>,
        /// Product code
        #[arg(long)]
        product: Option<String>,
        #[arg(long)]
        currency: Option<String>,
        /// Opening balance
        #[arg(long)]
        balance: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

/// Use the flag value, or ask for it
fn value_or_prompt(value: Option<String>, prompt: &str) -> Result<String> {
    match value {
        Some(v) => Ok(v),
        None => Ok(Input::new().with_prompt(prompt).interact_text()?),
    }
}

fn print_created<T: Serialize>(label: &str, record: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
    } else {
        println!("{}", format!("{} created", label).green());
        println!("{}", serde_json::to_string_pretty(record)?);
    }
    Ok(())
}

pub fn run(command: NewCommands) -> Result<()> {
    let ctx = get_context()?;
    let repo = &ctx.repository;

    match command {
        NewCommands::Branch { code, name, json } => {
            let code = value_or_prompt(code, "Branch code")?;
            let name = value_or_prompt(name, "Branch name")?;
            print_created("Branch", &repo.add_branch(&code, &name)?, json)
        }
        NewCommands::Product { code, name, json } => {
            let code = value_or_prompt(code, "Product code")?;
            let name = value_or_prompt(name, "Product name")?;
            print_created("Product", &repo.add_product(&code, &name)?, json)
        }
        NewCommands::Banker { code, name, branch_id, json } => {
            let code = value_or_prompt(code, "Banker code")?;
            let name = value_or_prompt(name, "Banker name")?;
            print_created("Banker", &repo.add_banker(&code, &name, branch_id)?, json)
        }
        NewCommands::Client { cif, name, json } => {
            let cif = value_or_prompt(cif, "CIF")?;
            let name = value_or_prompt(name, "Client name")?;
            print_created("Client", &repo.add_client(&cif, &name)?, json)
        }
        NewCommands::Account { number, cif, banker, product, currency, balance, json } => {
            let number = value_or_prompt(number, "Account number")?;
            let cif = value_or_prompt(cif, "Client CIF")?;

            let client = repo
                .find_client_by_cif(cif.trim())?
                .ok_or_else(|| anyhow!("No client with CIF {}", cif))?;
            let mut account = Account::new(&number, client.id);

            if let Some(code) = banker {
                let banker = repo
                    .find_banker_by_code(&code)?
                    .ok_or_else(|| anyhow!("No banker with code {}", code))?;
                account.banker_id = Some(banker.id);
            }
            if let Some(code) = product {
                let product = repo
                    .find_product_by_code(&code)?
                    .ok_or_else(|| anyhow!("No product with code {}", code))?;
                account.product_id = Some(product.id);
            }
            if let Some(currency) = currency {
                account.currency = Account::normalize_currency(&currency);
            }
            if let Some(balance) = balance {
                let amount: Decimal = balance
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("Invalid balance amount: {}", balance))?;
                account.current_balance = amount;
                account.available_balance = amount;
            }

            print_created("Account", &repo.add_account(&account)?, json)
        }
    }
}
