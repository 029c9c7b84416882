//! A simple CLI tool for talking to the voting contract directly.
//! This goes through the same ledger gateway as the server, so it reads and
//! writes exactly what the server would.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rocket::tokio::runtime::Builder;

use ledger_vote_backend::ledger::{
    LedgerCredentials, LedgerGateway, ReceiptStatus, RpcLedgerClient, TallyUnavailable, TransactionOutcome,
    TransactionSigner,
};

const PROGRAM_NAME: &str = "ledger-cli";

const ABOUT_TEXT: &str = "Inspect and drive the on-chain voting contract.

EXIT CODES:
     0: Success.
   255: The ledger rejected or could not answer the request.
 Other: Error.";

const RPC_URL: &str = "RPC_URL";
const CONTRACT: &str = "CONTRACT";
const ACCOUNT: &str = "ACCOUNT";
const PASSPHRASE: &str = "PASSPHRASE";
const PRIVATE_KEY: &str = "PRIVATE_KEY";
const CHAIN_ID: &str = "CHAIN_ID";
const TIMEOUT: &str = "TIMEOUT";
const LEDGER_ID: &str = "LEDGER_ID";
const CANDIDATE_INDEX: &str = "CANDIDATE_INDEX";
const TITLE: &str = "TITLE";
const CANDIDATES: &str = "CANDIDATES";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    let ledger_id = Arg::new(LEDGER_ID)
        .help("Index of the election in the contract")
        .value_parser(value_parser!(u64))
        .required(true);

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .subcommand_required(true)
        .arg(
            Arg::new(RPC_URL)
                .long("rpc-url")
                .help("JSON-RPC endpoint of the ledger node")
                .default_value("http://127.0.0.1:8545"),
        )
        .arg(
            Arg::new(CONTRACT)
                .long("contract")
                .help("Address of the voting contract")
                .required(true),
        )
        .arg(
            Arg::new(ACCOUNT)
                .long("account")
                .help("Account to send transactions from"),
        )
        .arg(
            Arg::new(PASSPHRASE)
                .long("passphrase")
                .help("Keystore passphrase of the sending account"),
        )
        .arg(
            Arg::new(PRIVATE_KEY)
                .long("private-key")
                .env("LEDGER_PRIVATE_KEY")
                .hide_env_values(true)
                .help("Hex private key to sign transactions with locally")
                .conflicts_with_all([ACCOUNT, PASSPHRASE]),
        )
        .arg(
            Arg::new(CHAIN_ID)
                .long("chain-id")
                .help("Chain id to sign for; read from the node if omitted")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new(TIMEOUT)
                .long("timeout")
                .help("Seconds to wait for each request and for receipts")
                .value_parser(value_parser!(u64))
                .default_value("10"),
        )
        .subcommand(Command::new("count").about("Print the number of elections"))
        .subcommand(
            Command::new("results")
                .about("Print the tally of an election")
                .arg(ledger_id.clone()),
        )
        .subcommand(
            Command::new("create")
                .about("Create an election and print its index once mined")
                .arg(Arg::new(TITLE).required(true))
                .arg(
                    Arg::new(CANDIDATES)
                        .action(ArgAction::Append)
                        .num_args(1..)
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("vote")
                .about("Cast a vote and wait for its receipt")
                .arg(ledger_id)
                .arg(
                    Arg::new(CANDIDATE_INDEX)
                        .help("Position of the candidate on the ballot")
                        .value_parser(value_parser!(usize))
                        .required(true),
                ),
        )
}

/// Errors that this program may produce.
#[derive(Debug)]
enum Error {
    /// The command line could not be turned into a client.
    Setup(String),
    /// The ledger did not do what was asked.
    Ledger(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup(msg) => write!(f, "{msg}"),
            Self::Ledger(msg) => write!(f, "Ledger error: {msg}"),
        }
    }
}

impl From<TallyUnavailable> for Error {
    fn from(err: TallyUnavailable) -> Self {
        Self::Ledger(err.to_string())
    }
}

fn gateway(args: &ArgMatches) -> Result<LedgerGateway, Error> {
    let missing = |name: &str| Error::Setup(format!("Missing argument {name}"));
    let url = args.get_one::<String>(RPC_URL).ok_or_else(|| missing(RPC_URL))?;
    let contract = args
        .get_one::<String>(CONTRACT)
        .ok_or_else(|| missing(CONTRACT))?;
    let timeout = Duration::from_secs(*args.get_one::<u64>(TIMEOUT).unwrap_or(&10));
    let client = RpcLedgerClient::new(url.clone(), contract.clone(), timeout, timeout)
        .map_err(|e| Error::Setup(e.to_string()))?;
    let client = client.with_chain_id(args.get_one::<u64>(CHAIN_ID).copied());
    let credentials = match args.get_one::<String>(PRIVATE_KEY) {
        Some(key) => {
            let signer = TransactionSigner::from_hex(key).map_err(|e| Error::Setup(e.to_string()))?;
            Some(LedgerCredentials::Key(Arc::new(signer)))
        }
        None => args
            .get_one::<String>(ACCOUNT)
            .map(|account| LedgerCredentials::Node {
                account: account.clone(),
                passphrase: args.get_one::<String>(PASSPHRASE).cloned(),
            }),
    };
    Ok(LedgerGateway::new(Arc::new(client), credentials))
}

/// Return the transaction reference, or why there is none.
fn submitted(outcome: TransactionOutcome) -> Result<String, Error> {
    match outcome {
        TransactionOutcome::Submitted { tx_ref } => Ok(tx_ref),
        TransactionOutcome::Skipped { reason } => Err(Error::Setup(format!(
            "{reason}, pass --private-key or --account to send transactions"
        ))),
        TransactionOutcome::Error { reason } => Err(Error::Ledger(reason)),
    }
}

async fn execute(args: &ArgMatches) -> Result<(), Error> {
    let gateway = gateway(args)?;
    match args.subcommand() {
        Some(("count", _)) => {
            println!("{}", gateway.election_count().await?);
        }
        Some(("results", sub)) => {
            let ledger_id = *sub.get_one::<u64>(LEDGER_ID).unwrap_or(&0);
            let tally = gateway.fetch_tally(ledger_id).await?;
            for (name, votes) in tally.candidates.iter().zip(&tally.votes) {
                println!("{name}: {votes}");
            }
        }
        Some(("create", sub)) => {
            let title = sub.get_one::<String>(TITLE).cloned().unwrap_or_default();
            let candidates: Vec<String> = sub
                .get_many::<String>(CANDIDATES)
                .map(|names| names.cloned().collect())
                .unwrap_or_default();
            let submission = gateway.submit_election(&title, &candidates).await;
            let tx_ref = submitted(submission.outcome)?;
            println!("Submitted {tx_ref}");
            match gateway
                .locate_election(&tx_ref, submission.expected, &candidates)
                .await?
            {
                Some(ledger_id) => println!("Created election {ledger_id}"),
                None => match gateway.receipt_status(&tx_ref).await? {
                    ReceiptStatus::Success => println!("Mined, but the new index could not be confirmed"),
                    status => {
                        return Err(Error::Ledger(format!("{tx_ref} was not mined successfully: {status:?}")))
                    }
                },
            }
        }
        Some(("vote", sub)) => {
            let ledger_id = *sub.get_one::<u64>(LEDGER_ID).unwrap_or(&0);
            let index = *sub.get_one::<usize>(CANDIDATE_INDEX).unwrap_or(&0);
            let tx_ref = submitted(gateway.submit_vote(ledger_id, index).await)?;
            println!("Submitted {tx_ref}");
            println!("Receipt: {:?}", gateway.receipt_status(&tx_ref).await?);
        }
        _ => return Err(Error::Setup("Unknown command".to_string())),
    }
    Ok(())
}

fn run(args: &ArgMatches) -> u8 {
    let runtime = match Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            return 1;
        }
    };
    match runtime.block_on(execute(args)) {
        Ok(()) => 0,
        Err(e @ Error::Setup(_)) => {
            eprintln!("{e}");
            1
        }
        Err(e @ Error::Ledger(_)) => {
            eprintln!("{e}");
            255
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}
