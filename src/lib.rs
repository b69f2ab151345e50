//! luadap - Debug Adapter Protocol bridge core for embedded Lua-family VMs.
//!
//! A host application embeds a scripting VM and attaches a [`debugger::Debugger`]
//! to it. The debugger installs itself into the VM's line/call/return hook,
//! listens for a DAP client on a TCP socket and, when a breakpoint or step
//! predicate matches, parks the VM thread inside the hook until the client
//! resumes it.

pub mod dap;
pub mod debugger;
pub mod vm;
