//! Termination signals become a stop request, so a run still releases the magnet.

use anyhow::{Context, Result};
use pendulum_core::simulation::CancellationToken;
use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};

pub const STOP_SIGNALS: [i32; 3] = [SIGINT, SIGQUIT, SIGTERM];

/// Routes every stop signal into `token` instead of the default process exit.
pub fn install(token: &CancellationToken) -> Result<()> {
    for signal in STOP_SIGNALS {
        signal_hook::flag::register(signal, token.flag())
            .with_context(|| format!("Failed to install handler for signal {signal}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pendulum_core::simulation::RunContext;
    use signal_hook::low_level::raise;

    #[test]
    fn stop_signal_cancels_the_run_context() {
        let token = CancellationToken::new();
        install(&token).unwrap();
        let mut ctx = RunContext::new(token.clone());
        assert!(!ctx.poll_cancellation());

        raise(SIGTERM).unwrap();
        assert!(token.is_cancelled());
        assert!(ctx.poll_cancellation());
        assert!(ctx.stop_requested);
    }
}
