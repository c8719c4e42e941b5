use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("wsmux {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: wsmux");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("mux_version: {}", wsmux_tunnel::MUX_VERSION);
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "build_target: {}",
        option_env!("WSMUX_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "features: tunnel={}, tls={}, cli=true",
        cfg!(feature = "tunnel"),
        cfg!(feature = "tls")
    );

    Ok(SUCCESS)
}
