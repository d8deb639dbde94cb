use mythlink_backend::{ProtocolRegistry, DEFAULT_CLIENT_VERSION};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("mythlink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let versions = ProtocolRegistry::standard()
        .versions()
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");

    println!("name: mythlink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("MYTHLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("default_client_protocol: {DEFAULT_CLIENT_VERSION}");
    println!("protocols: {versions}");

    Ok(SUCCESS)
}
