//! aloha-admin CLI tool
//!
//! Submits commands to a running aloha-node over its admin socket.
//!
//! Usage:
//!   aloha-admin register <caller> <alias> <metadata>
//!   aloha-admin approve-surfers <caller> <surfer>...
//!   aloha-admin approve-session <caller> <session> <index>
//!   aloha-admin mint <caller> <account> <amount>
//!   aloha-admin balance <account>
//!   aloha-admin send '<json command>'
//!   aloha-admin ping

use aloha_node::{AdminRequest, AdminResponse, LedgerCommand, NodeCommand};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::str::FromStr;

fn print_usage() {
    eprintln!("aloha-admin - Submit commands to an Aloha node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  aloha-admin register <caller> <alias> <metadata>          Register a surfer");
    eprintln!("  aloha-admin edit-surfer <caller> <surfer> <owner> <meta>   Change owner and metadata");
    eprintln!("  aloha-admin remove-surfer <caller> <surfer>               Remove a surfer (admin)");
    eprintln!("  aloha-admin approve-surfers <caller> <surfer>...          Attest to surfers");
    eprintln!("  aloha-admin approve-session <caller> <session> <index>    Approve own seat");
    eprintln!("  aloha-admin mint <caller> <account> <amount>              Mint base units (admin)");
    eprintln!("  aloha-admin burn <caller> <account> <amount>              Burn base units (admin)");
    eprintln!("  aloha-admin set-min-approvals <caller> <n>                Update setting (admin)");
    eprintln!("  aloha-admin set-surfer-interval <caller> <seconds>        Update setting (admin)");
    eprintln!("  aloha-admin set-session-interval <caller> <seconds>       Update setting (admin)");
    eprintln!("  aloha-admin balance <account>                             Show Aloha balance");
    eprintln!("  aloha-admin put-blob <file.json>                          Store a metadata document");
    eprintln!("  aloha-admin get-blob <address>                            Fetch a metadata document");
    eprintln!("  aloha-admin send '<json>'                                 Send a raw command line");
    eprintln!("  aloha-admin ping                                          Check if daemon is running");
    eprintln!();
    eprintln!("Sessions and signature batches are submitted with `send`, e.g.");
    eprintln!("  {{\"cmd\":\"create_session\",\"caller\":\"0x..\",\"draft\":{{..}},\"self_index\":0}}");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  ALOHA_SOCKET  Path to admin socket (default: ./aloha-data/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("ALOHA_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./aloha-data/admin.sock"))
}

fn send_line(line: &str) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to aloha-node at {:?}: {}\n\
             Is the aloha-node running?",
            socket_path, e
        )
    })?;

    // Send command
    writeln!(stream, "{}", line).map_err(|e| e.to_string())?;

    // Read response
    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn arg<T>(args: &[String], index: usize, name: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = args
        .get(index)
        .ok_or_else(|| format!("{} requires a <{}> argument", args[1], name))?;
    raw.parse()
        .map_err(|e| format!("Invalid <{}> {:?}: {}", name, raw, e))
}

fn parse_command(args: &[String]) -> Result<AdminRequest, String> {
    let ledger = AdminRequest::Ledger;
    let request = match args[1].as_str() {
        "register" => ledger(LedgerCommand::RegisterSurfer {
            caller: arg(args, 2, "caller")?,
            alias: arg(args, 3, "alias")?,
            metadata: arg(args, 4, "metadata")?,
        }),
        "edit-surfer" => ledger(LedgerCommand::EditSurfer {
            caller: arg(args, 2, "caller")?,
            surfer: arg(args, 3, "surfer")?,
            new_owner: arg(args, 4, "owner")?,
            metadata: arg(args, 5, "metadata")?,
        }),
        "remove-surfer" => ledger(LedgerCommand::RemoveSurfer {
            caller: arg(args, 2, "caller")?,
            surfer: arg(args, 3, "surfer")?,
        }),
        "approve-surfers" => {
            let caller = arg(args, 2, "caller")?;
            let targets = (3..args.len().max(4))
                .map(|i| arg(args, i, "surfer"))
                .collect::<Result<Vec<_>, _>>()?;
            ledger(LedgerCommand::ApproveSurfers { caller, targets })
        }
        "approve-session" => ledger(LedgerCommand::ApproveSession {
            caller: arg(args, 2, "caller")?,
            session: arg(args, 3, "session")?,
            index: arg(args, 4, "index")?,
        }),
        "mint" => ledger(LedgerCommand::Mint {
            caller: arg(args, 2, "caller")?,
            account: arg(args, 3, "account")?,
            amount: arg(args, 4, "amount")?,
        }),
        "burn" => ledger(LedgerCommand::Burn {
            caller: arg(args, 2, "caller")?,
            account: arg(args, 3, "account")?,
            amount: arg(args, 4, "amount")?,
        }),
        "set-min-approvals" => ledger(LedgerCommand::SetMinApprovals {
            caller: arg(args, 2, "caller")?,
            value: arg(args, 3, "n")?,
        }),
        "set-surfer-interval" => ledger(LedgerCommand::SetSurferAddInterval {
            caller: arg(args, 2, "caller")?,
            seconds: arg(args, 3, "seconds")?,
        }),
        "set-session-interval" => ledger(LedgerCommand::SetSessionAddInterval {
            caller: arg(args, 2, "caller")?,
            seconds: arg(args, 3, "seconds")?,
        }),
        "balance" => AdminRequest::Node(NodeCommand::Balance {
            account: arg(args, 2, "account")?,
        }),
        "put-blob" => {
            let path: PathBuf = arg(args, 2, "file.json")?;
            let data = std::fs::read(&path).map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
            let document = serde_json::from_slice(&data).map_err(|e| format!("Invalid JSON in {:?}: {}", path, e))?;
            AdminRequest::Node(NodeCommand::PutBlob { document })
        }
        "get-blob" => AdminRequest::Node(NodeCommand::GetBlob {
            address: arg(args, 2, "address")?,
        }),
        "send" => {
            let line: String = arg(args, 2, "json")?;
            AdminRequest::parse(&line).map_err(|e| format!("Invalid command: {}", e))?
        }
        "ping" => AdminRequest::Node(NodeCommand::Ping),
        other => return Err(format!("Unknown command: {}", other)),
    };
    Ok(request)
}

fn to_line(request: &AdminRequest) -> Result<String, String> {
    let line = match request {
        AdminRequest::Node(cmd) => serde_json::to_string(cmd),
        AdminRequest::Ledger(cmd) => serde_json::to_string(cmd),
    };
    line.map_err(|e| e.to_string())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }
    if matches!(args[1].as_str(), "-h" | "--help" | "help") {
        print_usage();
        std::process::exit(0);
    }

    let request = match parse_command(&args) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    match to_line(&request).and_then(|line| send_line(&line)) {
        Ok(response) => match response {
            AdminResponse::Ok { message } => {
                println!("{}", message);
            }
            AdminResponse::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            AdminResponse::Surfer { id } => {
                println!("surfer {}", id);
            }
            AdminResponse::Session { id } => {
                println!("session {}", id);
            }
            AdminResponse::Blob { address } => {
                println!("{}", address);
            }
            AdminResponse::Document { document } => match document {
                Some(document) => println!("{}", document),
                None => {
                    println!("(none)");
                    std::process::exit(1);
                }
            },
            AdminResponse::Balance { amount } => {
                println!("{}", amount);
            }
            AdminResponse::Pong => {
                println!("pong - aloha-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
