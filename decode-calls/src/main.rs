use std::io::{self, Read, Write};
use std::result::Result;

use calls::{ContractCall, ContractKind};

fn to_json_string(kind: ContractKind, str: &str) -> Result<String, Box<dyn std::error::Error>> {
    let call = ContractCall::decode(kind, &alloy_core::hex::decode(str.as_bytes())?)?;
    Ok(serde_json::to_string(&call)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let kind = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => ContractKind::Bulk,
    };

    let mut stdin = io::stdin();
    let mut buffer = String::new();
    stdin.read_to_string(&mut buffer)?;

    let j = to_json_string(kind, buffer.trim())?;

    let mut stdout = io::stdout();
    stdout.write_all(j.as_bytes())?;
    stdout.write_all(b"\n")?;
    stdout.flush()?;

    Ok(())
}
