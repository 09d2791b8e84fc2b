//! Template and diagnostics benchmarks
//!
//! Covers substitution, cached vs uncached loading, full entity generation and
//! compiler output parsing.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::path::PathBuf;
use std::sync::Arc;
use svcforge::codegen::{CodeAssembler, FieldDefinition, FieldKind, SchemaGenerationOptions};
use svcforge::template::{LoadOptions, TemplateLoader, TemplateVariables, substitute};
use svcforge::validation::{DiagnosticParser, TypeScriptDiagnosticParser};

fn templates_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("templates")
}

fn entity_options(field_count: usize) -> SchemaGenerationOptions {
    let kinds = [
        FieldKind::String,
        FieldKind::Number,
        FieldKind::Boolean,
        FieldKind::Date,
        FieldKind::Uuid,
    ];
    SchemaGenerationOptions::new("Product", "products").with_fields(
        (0..field_count).map(|i| FieldDefinition::new(format!("field{i}"), kinds[i % kinds.len()])),
    )
}

fn bench_substitution(c: &mut Criterion) {
    let mut group = c.benchmark_group("substitution");
    let vars = TemplateVariables::new()
        .with("ENTITY_NAME", "Product")
        .with("ENTITY_NAME_LOWER", "product")
        .with("TABLE_NAME", "products");

    for lines in [10usize, 100, 1000] {
        let template: String = (0..lines)
            .map(|i| format!("const {{ENTITY_NAME_LOWER}}{i} = new {{ENTITY_NAME}}(\"{{TABLE_NAME}}\", {{MISSING}});\n"))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(lines), &template, |b, template| {
            b.iter(|| substitute(black_box(template), black_box(&vars)))
        });
    }
    group.finish();
}

fn bench_loading(c: &mut Criterion) {
    let mut group = c.benchmark_group("template_load");
    let loader = TemplateLoader::new(templates_root());

    group.bench_function("cached", |b| {
        b.iter(|| {
            loader
                .load(black_box("components/drizzle/repository.mdx"), LoadOptions::default())
                .ok()
        })
    });
    group.bench_function("uncached", |b| {
        b.iter(|| {
            loader
                .load(black_box("components/drizzle/repository.mdx"), LoadOptions::uncached())
                .ok()
        })
    });
    group.finish();
}

fn bench_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("entity_generation");
    let assembler = CodeAssembler::new(Arc::new(TemplateLoader::new(templates_root())));

    for fields in [1usize, 10, 50] {
        let options = entity_options(fields);
        group.bench_with_input(BenchmarkId::from_parameter(fields), &options, |b, options| {
            b.iter(|| assembler.generate(black_box(options)).ok())
        });
    }
    group.finish();
}

fn bench_diagnostics(c: &mut Criterion) {
    let output: String = (0..500)
        .map(|i| {
            format!(
                "src/module{i}/service.ts({},{}): error TS2322: Type 'string' is not assignable to type 'number'.\n",
                i + 1,
                i % 40 + 1
            )
        })
        .collect();
    c.bench_function("typescript_diagnostics_500", |b| {
        b.iter(|| TypeScriptDiagnosticParser.parse(black_box(&output)))
    });
}

criterion_group!(
    benches,
    bench_substitution,
    bench_loading,
    bench_generation,
    bench_diagnostics,
);

criterion_main!(benches);
