//! Closed enumerations identifying pipelines, import modes and job types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::JobError;

/// External Nextflow pipeline a job runs. The lowercase name doubles as the
/// pipeline's directory and script name (`<name>/<name>.nf`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    Est,
    GenerateSsn,
    ColorSsn,
    Gnt,
    Gnd,
    NeighborhoodConn,
    ConvergenceRatio,
    ClusterAnalysis,
    Cgfp,
    Taxon,
}

impl Pipeline {
    pub fn as_str(self) -> &'static str {
        match self {
            Pipeline::Est => "est",
            Pipeline::GenerateSsn => "generatessn",
            Pipeline::ColorSsn => "colorssn",
            Pipeline::Gnt => "gnt",
            Pipeline::Gnd => "gnd",
            Pipeline::NeighborhoodConn => "neighborhoodconn",
            Pipeline::ConvergenceRatio => "convergenceratio",
            Pipeline::ClusterAnalysis => "clusteranalysis",
            Pipeline::Cgfp => "cgfp",
            Pipeline::Taxon => "taxon",
        }
    }

    /// Pipelines that take their sequence filters as one `filter` list.
    pub fn uses_composite_filter(self) -> bool {
        matches!(self, Pipeline::Est | Pipeline::Taxon)
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    Accession,
    Blast,
    Families,
    Fasta,
    View,
    Identify,
    Quantify,
}

impl ImportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportMode::Accession => "accession",
            ImportMode::Blast => "blast",
            ImportMode::Families => "families",
            ImportMode::Fasta => "fasta",
            ImportMode::View => "view",
            ImportMode::Identify => "identify",
            ImportMode::Quantify => "quantify",
        }
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted discriminator selecting a job variant and its field table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobType {
    EstGenerateFasta,
    EstGenerateFamilies,
    EstGenerateBlast,
    EstGenerateAccession,
    EstSsnFinalization,
    EstNeighborhoodConnectivity,
    EstConvergenceRatio,
    EstClusterAnalysis,
    EstColorSsn,
    GntGnn,
    GntDiagramBlast,
    GntDiagramFasta,
    GntDiagramSequenceId,
    GntViewDiagram,
    CgfpIdentify,
    CgfpQuantify,
    TaxonomyAccession,
    TaxonomyFamilies,
    TaxonomyFasta,
}

impl JobType {
    pub const ALL: [JobType; 19] = [
        JobType::EstGenerateFasta,
        JobType::EstGenerateFamilies,
        JobType::EstGenerateBlast,
        JobType::EstGenerateAccession,
        JobType::EstSsnFinalization,
        JobType::EstNeighborhoodConnectivity,
        JobType::EstConvergenceRatio,
        JobType::EstClusterAnalysis,
        JobType::EstColorSsn,
        JobType::GntGnn,
        JobType::GntDiagramBlast,
        JobType::GntDiagramFasta,
        JobType::GntDiagramSequenceId,
        JobType::GntViewDiagram,
        JobType::CgfpIdentify,
        JobType::CgfpQuantify,
        JobType::TaxonomyAccession,
        JobType::TaxonomyFamilies,
        JobType::TaxonomyFasta,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobType::EstGenerateFasta => "est_generate_fasta",
            JobType::EstGenerateFamilies => "est_generate_families",
            JobType::EstGenerateBlast => "est_generate_blast",
            JobType::EstGenerateAccession => "est_generate_accession",
            JobType::EstSsnFinalization => "est_ssn_finalization",
            JobType::EstNeighborhoodConnectivity => "est_neighborhood_connectivity",
            JobType::EstConvergenceRatio => "est_convergence_ratio",
            JobType::EstClusterAnalysis => "est_cluster_analysis",
            JobType::EstColorSsn => "est_color_ssn",
            JobType::GntGnn => "gnt_gnn",
            JobType::GntDiagramBlast => "gnt_diagram_blast",
            JobType::GntDiagramFasta => "gnt_diagram_fasta",
            JobType::GntDiagramSequenceId => "gnt_diagram_sequence_id",
            JobType::GntViewDiagram => "gnt_view_diagram",
            JobType::CgfpIdentify => "cgfp_identify",
            JobType::CgfpQuantify => "cgfp_quantify",
            JobType::TaxonomyAccession => "taxonomy_accession",
            JobType::TaxonomyFamilies => "taxonomy_families",
            JobType::TaxonomyFasta => "taxonomy_fasta",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| JobError::UnknownJobType(s.to_string()))
    }
}
