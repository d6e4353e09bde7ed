use criterion::{criterion_group, criterion_main, Criterion};

use mailpack::model::address::EmailAddress;
use mailpack::model::attachment::AttachmentDescriptor;
use mailpack::model::message::{BodyVariants, MessageFields};
use mailpack::parser::mime::parse_message;
use mailpack::synth::MessageSynthesizer;

fn sample_fields() -> MessageFields {
    MessageFields {
        subject: "Quarterly figures".to_string(),
        message_id: Some("<bench@example.org>".to_string()),
        from: Some(EmailAddress::new("Finance", "finance@example.org")),
        to: (0..20)
            .map(|i| EmailAddress::new(format!("Member {i}"), format!("m{i}@example.org")))
            .collect(),
        references: (0..30).map(|i| format!("<ref{i}@example.org>")).collect(),
        bodies: BodyVariants {
            text: Some("Figures attached.\n".repeat(200)),
            html: Some("<p>Figures attached.</p><img src=\"cid:chart\">".repeat(200)),
            rtf: None,
        },
        ..Default::default()
    }
}

fn bench_synthesize(c: &mut Criterion) {
    let fields = sample_fields();
    let attachments = vec![
        AttachmentDescriptor::inline("chart", vec![0x89; 16 * 1024]).with_media_type("image/png"),
        AttachmentDescriptor::file("figures.pdf", vec![b'%'; 256 * 1024])
            .with_media_type("application/pdf"),
    ];

    c.bench_function("synthesize_message", |b| {
        b.iter(|| MessageSynthesizer.synthesize(&fields, &attachments).unwrap())
    });
}

fn bench_parse_synthesized(c: &mut Criterion) {
    let fields = sample_fields();
    let bytes = MessageSynthesizer.synthesize(&fields, &[]).unwrap();

    c.bench_function("parse_synthesized_message", |b| {
        b.iter(|| parse_message(&bytes))
    });
}

criterion_group!(benches, bench_synthesize, bench_parse_synthesized);
criterion_main!(benches);
