//! Bulk exit list output.
//!
//! Both formats serialize the same [`PolicySet::enumerate`] result: the
//! text form is a commented header followed by one address per line, the
//! JSON form an array of `{"Address", "Fingerprint"}` objects.

use std::io::Write;

use crate::error::Result;
use crate::policyset::PolicySet;
use crate::target::AddressPort;

/// Timestamp layout of the "generated on" header line.
const GENERATED_FORMAT: &str = "%a %b %e %H:%M:%S UTC %Y";

impl PolicySet {
    /// Write the header lines of a text dump.
    pub fn write_dump_header<W: Write>(
        &self,
        w: &mut W,
        target: &AddressPort,
        max_age: u32,
    ) -> Result<()> {
        let url = &self.config().bulk_list_url;
        writeln!(
            w,
            "# This is a list of all Tor exit nodes from the past {} hours that can contact {} on port {} #",
            max_age, target.address, target.port
        )?;
        writeln!(
            w,
            "# You can update this list by visiting {}?ip={}&port={}&n={} #",
            url, target.address, target.port, max_age
        )?;
        writeln!(
            w,
            "# This file was generated on {} #",
            self.built_at().format(GENERATED_FORMAT)
        )?;
        Ok(())
    }

    /// Write a text dump: header, then one relay address per line.
    pub fn dump<W: Write>(&self, w: &mut W, target: &AddressPort, max_age: u32) -> Result<()> {
        self.write_dump_header(w, target, max_age)?;
        for entry in self.enumerate(target, max_age) {
            writeln!(w, "{}", entry.address)?;
        }
        Ok(())
    }

    /// Write a JSON dump of the same entries as [`PolicySet::dump`].
    pub fn dump_json<W: Write>(&self, w: &mut W, target: &AddressPort, max_age: u32) -> Result<()> {
        serde_json::to_writer(&mut *w, &self.enumerate(target, max_age))?;
        writeln!(w)?;
        Ok(())
    }
}
