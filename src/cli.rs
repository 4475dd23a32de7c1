//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// MySQL provider - databases and credentials for related applications
#[derive(Parser, Debug)]
#[command(name = "mysql-provider")]
#[command(version)]
#[command(about = "Provisions MySQL databases and credentials for related applications")]
#[command(
    long_about = "Reconciles relation requests into MySQL databases, users and grants, and offers the administrative actions of the provider unit."
)]
pub struct Cli {
    /// Configuration file (TOML, or JSON by extension)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controller, reading relation events as JSON lines on stdin
    Serve,

    /// Create a superuser with grant option
    CreateUser {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        password: String,
    },

    /// Delete an existing user
    DeleteUser {
        #[arg(short, long)]
        username: String,
    },

    /// Change the password of an existing user
    SetUserPassword {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        password: String,
    },

    /// Create a database that does not exist yet
    CreateDatabase {
        #[arg(short, long)]
        database: String,
    },

    /// Report the unit status
    Status,
}
