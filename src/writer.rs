//! Text serialization, the inverse of [`crate::parser::Parser`].
//!
//! Values are written so that parsing the output yields an equal tree.
//! The one lossy case is a string value that reads as another type
//! (`"42"`, `"true"`, or an `ACCESSION|name` pair), including the name part of
//! a value term: text carries no quoting, so it comes back typed.

use crate::ast::*;
use std::fmt::{self, Write};

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(group_id) = self.group_id {
            write!(f, "[{group_id}]")?;
        }
        write!(f, "{}|{}", self.accession, self.name)?;
        match (&self.value_accession, &self.value) {
            (Some(value_accession), value) => write!(f, "={value_accession}|{value}"),
            (None, AttributeValue::Null) => Ok(()),
            (None, value) => write!(f, "={value}"),
        }
    }
}

impl fmt::Display for Peak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.mz, self.intensity)?;
        if !self.annotations.is_empty() || !self.aggregations.is_empty() {
            write!(f, "\t{}", self.annotations.join(","))?;
        }
        if !self.aggregations.is_empty() {
            write!(f, "\t{}", self.aggregations.join(","))?;
        }
        Ok(())
    }
}

/// Renders a whole library in the text format.
pub fn to_text(library: &Library) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_library(&mut out, library);
    out
}

pub fn write_library<W: Write>(out: &mut W, library: &Library) -> fmt::Result {
    writeln!(out, "<mzSpecLib>")?;
    write_attributes(out, &library.attributes)?;
    writeln!(out)?;

    for set in library.attribute_sets.values() {
        writeln!(out, "<AttributeSet {}={}>", set.target, set.name)?;
        write_attributes(out, &set.attributes)?;
        writeln!(out)?;
    }
    for spectrum in &library.spectra {
        write_spectrum(out, spectrum)?;
    }
    for cluster in &library.clusters {
        write_cluster(out, cluster)?;
    }
    Ok(())
}

pub fn write_record<W: Write>(out: &mut W, record: &Record) -> fmt::Result {
    match record {
        Record::Spectrum(spectrum) => write_spectrum(out, spectrum),
        Record::Cluster(cluster) => write_cluster(out, cluster),
    }
}

pub fn write_spectrum<W: Write>(out: &mut W, spectrum: &Spectrum) -> fmt::Result {
    writeln!(out, "<Spectrum={}>", spectrum.id)?;
    write_attributes(out, &spectrum.attributes)?;

    for analyte in spectrum.analytes.values() {
        writeln!(out, "<Analyte={}>", analyte.id)?;
        write_attributes(out, &analyte.attributes)?;
    }
    for interpretation in spectrum.interpretations.values() {
        writeln!(out, "<Interpretation={}>", interpretation.id)?;
        write_attributes(out, &interpretation.attributes)?;
        for member in interpretation.members.values() {
            writeln!(out, "<InterpretationMember={}>", member.id)?;
            write_attributes(out, &member.attributes)?;
        }
    }

    writeln!(out, "<Peaks>")?;
    for peak in &spectrum.peaks {
        writeln!(out, "{peak}")?;
    }
    writeln!(out)
}

pub fn write_cluster<W: Write>(out: &mut W, cluster: &Cluster) -> fmt::Result {
    writeln!(out, "<Cluster={}>", cluster.id)?;
    write_attributes(out, &cluster.attributes)?;
    writeln!(out)
}

fn write_attributes<W: Write>(out: &mut W, attributes: &Attributes) -> fmt::Result {
    for attribute in attributes {
        writeln!(out, "{attribute}")?;
    }
    Ok(())
}
