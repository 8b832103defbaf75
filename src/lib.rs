//! Emulation core for the NES: a cycle-counted 6502 interpreter, a
//! dot-accurate 2C02 pixel pipeline, the system bus connecting them, and the
//! cartridge bank-mapping logic.
//!
//! The crate is presentation-free. A frontend feeds it a parsed cartridge,
//! drives [`nes::Nes::run_frame`] once per display refresh, polls
//! [`nes::Nes::take_frame`] for finished pixels, and pushes controller state
//! in through [`nes::Nes::set_buttons`].

pub mod nes;
