//! Job variants and the field groups they are composed from.
//!
//! Tables are assembled once on first use and shared for the life of the
//! process. Adding a variant means adding a `JobType`, its entry in
//! [`variant_groups`] and, if it needs new columns, a migration.

use std::collections::HashMap;
use std::sync::LazyLock;

use super::metadata::{FieldGroup, FieldSpec, FieldTable};
use super::{FieldKind, ImportMode, JobType, Pipeline};

pub const BASE: FieldGroup = FieldGroup {
    name: "base",
    fields: &[
        FieldSpec::new("id", FieldKind::Int).parameter_key("job_id"),
        FieldSpec::new("uuid", FieldKind::Text),
        FieldSpec::new("status", FieldKind::Status).updatable(),
        FieldSpec::new("isPublic", FieldKind::Bool),
        FieldSpec::new("jobType", FieldKind::Text),
        FieldSpec::new("user_id", FieldKind::Int),
        FieldSpec::new("timeCreated", FieldKind::Time),
        FieldSpec::new("timeStarted", FieldKind::Time).updatable(),
        FieldSpec::new("timeCompleted", FieldKind::Time).updatable(),
        FieldSpec::new("efi_db_version", FieldKind::Text).parameter_key("efi_db"),
        FieldSpec::new("isExample", FieldKind::Bool),
        FieldSpec::new("parentJobId", FieldKind::Int),
        FieldSpec::new("schedulerJobId", FieldKind::Int).updatable(),
        FieldSpec::new("jobName", FieldKind::Text).parameter(),
    ],
};

pub const ALIGNMENT_SCORE: FieldGroup = FieldGroup {
    name: "alignment_score",
    fields: &[FieldSpec::new("alignmentScore", FieldKind::Int).parameter()],
};

pub const SEQUENCE_LENGTH: FieldGroup = FieldGroup {
    name: "sequence_length",
    fields: &[
        FieldSpec::new("minLength", FieldKind::Int).parameter_key("min_length"),
        FieldSpec::new("maxLength", FieldKind::Int).parameter_key("max_length"),
    ],
};

pub const PROTEIN_FAMILY_ADDITION: FieldGroup = FieldGroup {
    name: "protein_family_addition",
    fields: &[
        FieldSpec::new("families", FieldKind::Text).parameter(),
        FieldSpec::new("sequence_version", FieldKind::Text).parameter(),
        FieldSpec::new("fraction", FieldKind::Int).parameter(),
        FieldSpec::new("numUnirefClusters", FieldKind::Int).parameter(),
    ],
};

pub const DOMAIN_BOUNDARIES: FieldGroup = FieldGroup {
    name: "domain_boundaries",
    fields: &[
        FieldSpec::new("domain", FieldKind::Bool).parameter(),
        FieldSpec::new("domainRegion", FieldKind::Text).parameter(),
    ],
};

pub const EXCLUDE_FRAGMENTS: FieldGroup = FieldGroup {
    name: "exclude_fragments",
    fields: &[FieldSpec::new("excludeFragments", FieldKind::Bool)
        .parameter_key("fragment")
        .filter()],
};

pub const FILTER_BY_TAXONOMY: FieldGroup = FieldGroup {
    name: "filter_by_taxonomy",
    fields: &[
        FieldSpec::new("taxSearch", FieldKind::Text)
            .parameter_key("taxonomy")
            .filter(),
        FieldSpec::new("taxSearchName", FieldKind::Text).parameter(),
    ],
};

pub const FILTER_BY_FAMILIES: FieldGroup = FieldGroup {
    name: "filter_by_families",
    fields: &[FieldSpec::new("filterByFamilies", FieldKind::Text)
        .parameter_key("family")
        .filter()],
};

pub const USER_UPLOADED_IDS: FieldGroup = FieldGroup {
    name: "user_uploaded_ids",
    fields: &[
        FieldSpec::new("numMatchedIds", FieldKind::Int).result_key("num_matched"),
        FieldSpec::new("numUnmatchedIds", FieldKind::Int).result_key("num_unmatched"),
    ],
};

pub const FILENAME: FieldGroup = FieldGroup {
    name: "filename",
    fields: &[
        FieldSpec::new("uploadedFilename", FieldKind::Text).parameter(),
        FieldSpec::new("jobFilename", FieldKind::Text).parameter(),
        FieldSpec::new("updatedAt", FieldKind::Time)
            .parameter()
            .updatable(),
    ],
};

pub const SEQUENCE_DATABASE: FieldGroup = FieldGroup {
    name: "sequence_database",
    fields: &[
        FieldSpec::new("blastEValue", FieldKind::Int).parameter_key("import_blast_evalue"),
        FieldSpec::new("maxBlastSequences", FieldKind::Int)
            .parameter_key("import_blast_num_matches"),
        FieldSpec::new("sequenceDatabase", FieldKind::Text).updatable(),
    ],
};

pub const SEARCH: FieldGroup = FieldGroup {
    name: "search",
    fields: &[FieldSpec::new("searchType", FieldKind::Text).parameter()],
};

pub const EST_GENERATE: FieldGroup = FieldGroup {
    name: "est_generate",
    fields: &[
        FieldSpec::new("allByAllBlastEValue", FieldKind::Int).parameter_key("blast_evalue"),
        FieldSpec::new("numFamilyOverlap", FieldKind::Int).updatable(),
        FieldSpec::new("numNonFamily", FieldKind::Int).updatable(),
        FieldSpec::new("numUnirefFamilyOverlap", FieldKind::Int).updatable(),
        FieldSpec::new("numComputedSequences", FieldKind::Int).updatable(),
        FieldSpec::new("numUniqueSequences", FieldKind::Int).updatable(),
        FieldSpec::new("numBlastEdges", FieldKind::Int).updatable(),
    ],
};

pub const GNT_DIAGRAM: FieldGroup = FieldGroup {
    name: "gnt_diagram",
    fields: &[FieldSpec::new("neighborhoodWindowSize", FieldKind::Int).parameter_key("nb_size")],
};

// Variant-specific columns.

const EST_ACCESSION: FieldGroup = FieldGroup {
    name: "est_generate_accession",
    fields: &[FieldSpec::new("domainFamily", FieldKind::Text).parameter_key("domain_family")],
};

const SSN_FINALIZATION: FieldGroup = FieldGroup {
    name: "est_ssn_finalization",
    fields: &[FieldSpec::new("computeNeighborhoodConnectivity", FieldKind::Bool).parameter()],
};

const CLUSTER_ANALYSIS: FieldGroup = FieldGroup {
    name: "est_cluster_analysis",
    fields: &[
        FieldSpec::new("minSeqMSA", FieldKind::Int).parameter(),
        FieldSpec::new("maxSeqMSA", FieldKind::Int).parameter(),
    ],
};

const GNT_GNN: FieldGroup = FieldGroup {
    name: "gnt_gnn",
    fields: &[
        FieldSpec::new("cooccurrence", FieldKind::Float).parameter_key("cooc_threshold"),
        FieldSpec::new("neighborhood_size", FieldKind::Int).parameter_key("nb_size"),
    ],
};

const CGFP_IDENTIFY: FieldGroup = FieldGroup {
    name: "cgfp_identify",
    fields: &[
        FieldSpec::new("referenceDatabase", FieldKind::Text).parameter(),
        FieldSpec::new("cdhitSequenceIdentity", FieldKind::Int).parameter(),
    ],
};

const CGFP_QUANTIFY: FieldGroup = FieldGroup {
    name: "cgfp_quantify",
    fields: &[FieldSpec::new("metagenomes", FieldKind::Text).parameter()],
};

/// Every group that contributes columns to the job table.
pub const ALL_GROUPS: &[&FieldGroup] = &[
    &BASE,
    &ALIGNMENT_SCORE,
    &SEQUENCE_LENGTH,
    &PROTEIN_FAMILY_ADDITION,
    &DOMAIN_BOUNDARIES,
    &EXCLUDE_FRAGMENTS,
    &FILTER_BY_TAXONOMY,
    &FILTER_BY_FAMILIES,
    &USER_UPLOADED_IDS,
    &FILENAME,
    &SEQUENCE_DATABASE,
    &SEARCH,
    &EST_GENERATE,
    &GNT_DIAGRAM,
    &EST_ACCESSION,
    &SSN_FINALIZATION,
    &CLUSTER_ANALYSIS,
    &GNT_GNN,
    &CGFP_IDENTIFY,
    &CGFP_QUANTIFY,
];

/// Static description of one job variant.
#[derive(Debug)]
pub struct VariantSpec {
    pub job_type: JobType,
    pub pipeline: Pipeline,
    pub import_mode: Option<ImportMode>,
    pub fields: FieldTable,
}

impl VariantSpec {
    /// Whether jobs of this variant reference an uploaded input file.
    pub fn takes_input_file(&self) -> bool {
        self.fields.contains("jobFilename")
    }
}

fn variant_groups(job_type: JobType) -> (Pipeline, Option<ImportMode>, Vec<&'static FieldGroup>) {
    use ImportMode as M;
    use JobType as T;
    use Pipeline as P;

    match job_type {
        T::EstGenerateFasta => (
            P::Est,
            Some(M::Fasta),
            vec![
                &EST_GENERATE,
                &FILENAME,
                &FILTER_BY_FAMILIES,
                &PROTEIN_FAMILY_ADDITION,
                &USER_UPLOADED_IDS,
            ],
        ),
        T::EstGenerateFamilies => (
            P::Est,
            Some(M::Families),
            vec![
                &EST_GENERATE,
                &DOMAIN_BOUNDARIES,
                &EXCLUDE_FRAGMENTS,
                &FILTER_BY_TAXONOMY,
                &PROTEIN_FAMILY_ADDITION,
            ],
        ),
        T::EstGenerateBlast => (
            P::Est,
            Some(M::Blast),
            vec![
                &EST_GENERATE,
                &FILENAME,
                &EXCLUDE_FRAGMENTS,
                &FILTER_BY_TAXONOMY,
                &PROTEIN_FAMILY_ADDITION,
                &SEQUENCE_DATABASE,
            ],
        ),
        T::EstGenerateAccession => (
            P::Est,
            Some(M::Accession),
            vec![
                &EST_GENERATE,
                &DOMAIN_BOUNDARIES,
                &EXCLUDE_FRAGMENTS,
                &FILENAME,
                &FILTER_BY_FAMILIES,
                &FILTER_BY_TAXONOMY,
                &PROTEIN_FAMILY_ADDITION,
                &USER_UPLOADED_IDS,
                &EST_ACCESSION,
            ],
        ),
        T::EstSsnFinalization => (
            P::GenerateSsn,
            None,
            vec![
                &ALIGNMENT_SCORE,
                &EXCLUDE_FRAGMENTS,
                &FILTER_BY_TAXONOMY,
                &SEQUENCE_LENGTH,
                &SSN_FINALIZATION,
            ],
        ),
        T::EstNeighborhoodConnectivity => (P::NeighborhoodConn, None, vec![&FILENAME]),
        T::EstConvergenceRatio => (
            P::ConvergenceRatio,
            None,
            vec![&ALIGNMENT_SCORE, &FILENAME],
        ),
        T::EstClusterAnalysis => (
            P::ClusterAnalysis,
            None,
            vec![&FILENAME, &CLUSTER_ANALYSIS],
        ),
        T::EstColorSsn => (P::ColorSsn, None, vec![&FILENAME]),
        T::GntGnn => (P::Gnt, None, vec![&GNT_DIAGRAM, &FILENAME, &GNT_GNN]),
        T::GntDiagramBlast => (
            P::Gnd,
            Some(M::Blast),
            vec![&GNT_DIAGRAM, &EXCLUDE_FRAGMENTS, &FILENAME, &SEQUENCE_DATABASE],
        ),
        T::GntDiagramFasta => (P::Gnd, Some(M::Fasta), vec![&GNT_DIAGRAM, &FILENAME]),
        T::GntDiagramSequenceId => (
            P::Gnd,
            Some(M::Accession),
            vec![&GNT_DIAGRAM, &EXCLUDE_FRAGMENTS, &FILENAME, &SEQUENCE_DATABASE],
        ),
        T::GntViewDiagram => (P::Gnd, Some(M::View), vec![&FILENAME]),
        T::CgfpIdentify => (
            P::Cgfp,
            Some(M::Identify),
            vec![&FILENAME, &SEARCH, &SEQUENCE_LENGTH, &CGFP_IDENTIFY],
        ),
        T::CgfpQuantify => (P::Cgfp, Some(M::Quantify), vec![&SEARCH, &CGFP_QUANTIFY]),
        T::TaxonomyAccession => (
            P::Taxon,
            Some(M::Accession),
            vec![
                &EXCLUDE_FRAGMENTS,
                &FILTER_BY_FAMILIES,
                &FILTER_BY_TAXONOMY,
                &FILENAME,
                &SEQUENCE_DATABASE,
            ],
        ),
        T::TaxonomyFamilies => (
            P::Taxon,
            Some(M::Families),
            vec![
                &EXCLUDE_FRAGMENTS,
                &FILTER_BY_FAMILIES,
                &FILTER_BY_TAXONOMY,
                &SEQUENCE_LENGTH,
            ],
        ),
        T::TaxonomyFasta => (
            P::Taxon,
            Some(M::Fasta),
            vec![
                &EXCLUDE_FRAGMENTS,
                &FILENAME,
                &FILTER_BY_FAMILIES,
                &FILTER_BY_TAXONOMY,
            ],
        ),
    }
}

static VARIANTS: LazyLock<HashMap<JobType, VariantSpec>> = LazyLock::new(|| {
    JobType::ALL
        .iter()
        .map(|&job_type| {
            let (pipeline, import_mode, groups) = variant_groups(job_type);
            let mut all: Vec<&FieldGroup> = Vec::with_capacity(groups.len() + 1);
            all.push(&BASE);
            all.extend(groups);
            let spec = VariantSpec {
                job_type,
                pipeline,
                import_mode,
                fields: FieldTable::from_groups(&all),
            };
            (job_type, spec)
        })
        .collect()
});

impl JobType {
    /// The variant description for this job type.
    pub fn spec(self) -> &'static VariantSpec {
        &VARIANTS[&self]
    }

    pub fn pipeline(self) -> Pipeline {
        self.spec().pipeline
    }

    pub fn import_mode(self) -> Option<ImportMode> {
        self.spec().import_mode
    }
}
