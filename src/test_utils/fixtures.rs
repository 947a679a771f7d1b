use crate::datamodel::Batch;

pub const APOE_VARIANT: &str = r#"{"alternate":"C","reference":"T","chromosome":"19","start":45411941,"end":45411941,"geneName":"APOE"}"#;

pub const PTPRE_VARIANT: &str = r#"{"alternate":"A","reference":"G","chromosome":"10","start":129839177,"end":129839177,"geneName":"PTPRE"}"#;

/// A COSMIC-like mutation record, leading space included.
pub const APOE_MUTATION: &str = r#" {"alternate":"C","reference":"T","chromosome":"19","start":45411941,"end":45411941,"geneName":"APOE","mutationGRCh37Strand":"+","primarySite":"large_intestine","mutationAA":"p.C130R","tumourOrigin":"primary","histologySubtype":"adenocarcinoma","accessionNumber":"ENST00000252486","mutationID":"3749517","mutationCDS":"c.388T>C","sampleName":"TCGA-AH-6644-01","primaryHistology":"carcinoma","mutationGRCh37GenomePosition":"19:45411941-45411941","mutationDescription":"Substitution - Missense","genomeWideScreen":"y","idSample":"1651586","mutationSomaticStatus":"Confirmed somatic variant","siteSubtype":"rectum","geneCDSLength":954,"hgncId":"613","sampleSource":"NS","age":73.0,"snp":true,"idStudy":375,"id_tumour":"1566373"}"#;

pub const MALFORMED: &str = "malformed-json";

/// A distinct well-formed variant record.
pub fn variant_record(index: u64) -> String {
    format!(
        r#"{{"_id":"var-{index}","chromosome":"{}","start":{},"reference":"A","alternate":"G"}}"#,
        index % 22 + 1,
        1_000 + index
    )
}

/// `count` batches of `size` distinct variant records each.
pub fn variant_batches(count: u64, size: u64) -> Vec<Batch> {
    (0..count)
        .map(|sequence| {
            let records = (0..size)
                .map(|offset| variant_record(sequence * size + offset))
                .collect();
            Batch::new(sequence, records)
        })
        .collect()
}
