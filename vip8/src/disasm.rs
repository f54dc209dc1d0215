//! Disassembler.
use std::fmt::{self, Write as FmtWrite};

use crate::constants::MEM_START;
use crate::decode::decode;

/// Renders a program image as assembly mnemonics.
///
/// Driven by the same decode function the virtual machine executes
/// through, so the listing is exactly what the machine would run. Words
/// that do not decode are rendered as data.
pub struct Disassembler<'a> {
    image: &'a [u8],
}

impl<'a> Disassembler<'a> {
    pub fn new(image: &'a [u8]) -> Self {
        Self { image }
    }

    /// Write the whole listing to the given writer.
    pub fn disassemble<W: FmtWrite>(&self, w: &mut W) -> fmt::Result {
        let mut words = self.image.chunks_exact(2);

        for (i, pair) in words.by_ref().enumerate() {
            let addr = MEM_START + i * 2;
            let word = ((pair[0] as u16) << 8) | pair[1] as u16;
            match decode(word) {
                Some(op) => writeln!(w, "{addr:04X}: {word:04X}  {op}")?,
                None => writeln!(w, "{addr:04X}: {word:04X}  .data")?,
            }
        }

        // A trailing odd byte can't be an instruction.
        if let [last] = words.remainder() {
            let addr = MEM_START + self.image.len() - 1;
            writeln!(w, "{addr:04X}: {last:02X}    .data")?;
        }

        Ok(())
    }

    /// Print the listing to stdout.
    pub fn print(&self) -> fmt::Result {
        let mut buf = String::new();
        self.disassemble(&mut buf)?;
        println!("{buf}");
        Ok(())
    }
}
