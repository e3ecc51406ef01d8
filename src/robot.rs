//! Turnkey assembly: a device root, a script runtime, and the TCP server,
//! wired the way a small robot exposes itself to a driver-station console.
//!
//! The host owns the control loop; it calls
//! `robot.autonomous().next()` at its own cadence to advance whatever
//! script the console loaded.

use std::net::SocketAddr;

use anyhow::Result;

use crate::device::device_module;
use crate::module::Module;
use crate::script::ScriptRuntime;
use crate::server::Server;

/// A served command tree for one device.
///
/// The root module is the device itself (timing helpers installed); the
/// script runtime is adopted under it as `runtime`, so consoles reach it
/// with lines like `runtime load ...`.
#[derive(Debug)]
pub struct Robot {
    module: Module,
    autonomous: ScriptRuntime,
    server: Server,
}

impl Robot {
    /// Build the tree and start serving it on `port` (0 for ephemeral).
    pub async fn launch(id: impl Into<String>, port: u16) -> Result<Self> {
        let module = device_module(id);
        let autonomous = ScriptRuntime::new(&module);
        module.adopt(autonomous.module());
        let server = Server::start(port, module.clone()).await?;
        log::info!("[Robot] Module \"{}\" is live on {}", module.id(), server.local_addr());
        Ok(Self { module, autonomous, server })
    }

    /// The root module of the served tree.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// The script runtime; drive it with [`ScriptRuntime::next`] from the
    /// host's control loop.
    pub fn autonomous(&self) -> &ScriptRuntime {
        &self.autonomous
    }

    /// Address the command server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Stop the server and its connections. The module tree itself stays
    /// usable in-process.
    pub fn shutdown(self) {
        self.server.shutdown();
    }
}
