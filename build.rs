//! Add build information.
#![allow(clippy::expect_used)]

use anyhow::Result;
use vergen_gitcl::{BuildBuilder, CargoBuilder, Emitter, GitclBuilder, RustcBuilder, SysinfoBuilder};

fn main() -> Result<()> {
	let build = BuildBuilder::all_build()?;
	let cargo = CargoBuilder::all_cargo()?;
	let gitcl = GitclBuilder::all_git()?;
	let rustc = RustcBuilder::all_rustc()?;
	let si = SysinfoBuilder::all_sysinfo()?;

	Emitter::default()
		.add_instructions(&build)?
		.add_instructions(&cargo)?
		.add_instructions(&gitcl)?
		.add_instructions(&rustc)?
		.add_instructions(&si)?
		.emit()
}
