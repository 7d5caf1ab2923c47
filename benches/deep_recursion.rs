//! Interpreter benchmarks
//!
//! Measures the frame-stack interpreter with:
//! - Recursive named templates of growing depth (1k, 10k, 50k)
//! - Key lookups against catalogs of growing size, where the first lookup
//!   builds the key table and every later one hits it
//!
//! Run benchmarks: `cargo bench --bench deep_recursion`
//!
//! Compare specific groups:
//! ```text
//! cargo bench --bench deep_recursion -- "recursion_depth"
//! cargo bench --bench deep_recursion -- "key_lookup"
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use xform::Transformer;

const XSLT_NS: &str = "http://www.w3.org/1999/XSL/Transform";

fn countdown(depth: usize) -> String {
    format!(
        r#"<xsl:stylesheet version="1.0" xmlns:xsl="{XSLT_NS}">
            <xsl:template name="countdown">
                <xsl:param name="n"/>
                <xsl:if test="$n = 0">done</xsl:if>
                <xsl:if test="$n > 0">
                    <xsl:call-template name="countdown">
                        <xsl:with-param name="n" select="$n - 1"/>
                    </xsl:call-template>
                </xsl:if>
            </xsl:template>
            <xsl:template match="/">
                <xsl:call-template name="countdown">
                    <xsl:with-param name="n" select="{depth}"/>
                </xsl:call-template>
            </xsl:template>
        </xsl:stylesheet>"#
    )
}

fn key_lookups() -> String {
    format!(
        r#"<xsl:stylesheet version="1.0" xmlns:xsl="{XSLT_NS}">
            <xsl:key name="by-cat" match="item" use="@cat"/>
            <xsl:template match="/"><xsl:apply-templates select="catalog/item"/></xsl:template>
            <xsl:template match="item"><xsl:value-of select="count(key('by-cat', @cat))"/></xsl:template>
        </xsl:stylesheet>"#
    )
}

fn catalog(count: usize) -> String {
    let mut xml = String::from("<catalog>");
    for i in 0..count {
        xml.push_str(&format!(r#"<item cat="c{}">{}</item>"#, i % 16, i));
    }
    xml.push_str("</catalog>");
    xml
}

fn bench_recursion_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("recursion_depth");
    group.sample_size(10);

    for depth in [1_000, 10_000, 50_000] {
        let transformer = Transformer::from_source(&countdown(depth)).unwrap();
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| black_box(transformer.transform_str("<r/>").unwrap()))
        });
    }
    group.finish();
}

fn bench_key_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_lookup");
    let transformer = Transformer::from_source(&key_lookups()).unwrap();

    for items in [100, 1_000, 10_000] {
        let xml = catalog(items);
        group.throughput(Throughput::Elements(items as u64));
        group.bench_with_input(BenchmarkId::from_parameter(items), &xml, |b, xml| {
            b.iter(|| black_box(transformer.transform_str(xml).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_recursion_depth, bench_key_lookup);
criterion_main!(benches);
