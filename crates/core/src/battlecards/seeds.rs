use super::CardCategory;

/// Static card definition compiled into the binary.
#[derive(Debug, Clone, Copy)]
pub(super) struct CardSeed {
    pub key: &'static str,
    pub category: CardCategory,
    pub title: &'static str,
    pub triggers: &'static [&'static str],
    pub primary: &'static str,
    pub alternates: &'static [&'static str],
    pub follow_up: &'static str,
    pub tone_hint: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct AliasSeed {
    pub phrase: &'static str,
    pub card_key: &'static str,
}

pub(super) const CARD_SEEDS: &[CardSeed] = &[
    CardSeed {
        key: "price",
        category: CardCategory::Objection,
        title: "Cena a rozpočet",
        triggers: &["rozpočet", "drahé", "moc peněz", "teď ne", "nemáme peníze", "cena"],
        primary: "Rozumím, rozpočet je vždycky omezený. Kolik vás dnes stojí to, že problém \
                  řešíte ručně? Když to spočítáme, často vyjde, že řešení se zaplatí samo.",
        alternates: &[
            "Můžeme začít menším rozsahem a rozšířit ho, až uvidíte výsledky.",
            "Co kdybychom se podívali, jak to zapadá do rozpočtu na příští kvartál?",
        ],
        follow_up: "Kdo u vás rozhoduje o rozpočtu na tuhle oblast?",
        tone_hint: Some("klidně, bez obhajování ceny"),
    },
    CardSeed {
        key: "timing",
        category: CardCategory::Objection,
        title: "Teď není vhodná doba",
        triggers: &["nemám čas", "zavolejte později", "není vhodná doba", "pošlete mi email"],
        primary: "Chápu, nebudu vás zdržovat. Dvě minuty stačí, abychom zjistili, jestli má \
                  smysl se bavit dál. Můžu položit jednu otázku?",
        alternates: &["Kdy se vám to hodí lépe, zítra dopoledne nebo ve čtvrtek odpoledne?"],
        follow_up: "Co vás teď nejvíc zaměstnává?",
        tone_hint: Some("stručně, respektovat čas"),
    },
    CardSeed {
        key: "competitor",
        category: CardCategory::Objection,
        title: "Už máme dodavatele",
        triggers: &["už máme", "jiný dodavatel", "konkurence", "spokojeni s"],
        primary: "To je dobře, že to máte pokryté. Co byste na současném řešení zlepšili, \
                  kdybyste mohli?",
        alternates: &["Většina našich klientů přišla od jiného dodavatele kvůli rychlosti \
                      nasazení. Jak dlouho trvalo nasazení u vás?"],
        follow_up: "Kdy vám končí současná smlouva?",
        tone_hint: None,
    },
    CardSeed {
        key: "not-interested",
        category: CardCategory::Objection,
        title: "Nemáme zájem",
        triggers: &["nemáme zájem", "nezajímá", "nepotřebujeme"],
        primary: "Rozumím. Než to uzavřeme, můžu se zeptat, jak dnes řešíte evidenci \
                  obchodních příležitostí?",
        alternates: &[],
        follow_up: "Co by se muselo stát, aby to pro vás začalo být téma?",
        tone_hint: Some("zvědavě, netlačit"),
    },
    CardSeed {
        key: "authority",
        category: CardCategory::Objection,
        title: "Musím se poradit",
        triggers: &["musím se poradit", "rozhoduje", "šéf", "musím to probrat"],
        primary: "Jasně, dává smysl to probrat. Co myslíte, že bude pro vedení nejdůležitější?",
        alternates: &["Pomohlo by, kdybychom udělali krátkou ukázku i pro vedení?"],
        follow_up: "Kdo další by měl být u dalšího hovoru?",
        tone_hint: None,
    },
    CardSeed {
        key: "security",
        category: CardCategory::Security,
        title: "Bezpečnost a GDPR",
        triggers: &["gdpr", "bezpečnost", "osobní údaje", "kde jsou data", "certifikace"],
        primary: "Data držíme v EU, máme certifikaci ISO 27001 a podepisujeme zpracovatelskou \
                  smlouvu. Pošlu vám bezpečnostní dokumentaci.",
        alternates: &["Můžeme domluvit hovor s naším bezpečnostním týmem."],
        follow_up: "Máte interní checklist pro dodavatele, který bychom měli vyplnit?",
        tone_hint: Some("věcně, konkrétní fakta"),
    },
    CardSeed {
        key: "next-step",
        category: CardCategory::NextStep,
        title: "Domluvit další krok",
        triggers: &["pošlete nabídku", "další krok", "schůzku", "ukázku", "demo"],
        primary: "Skvělé. Navrhuji 30minutovou ukázku na vašich datech. Hodí se vám úterý \
                  v deset?",
        alternates: &["Nabídku pošlu do zítřka, můžeme ji projít spolu ve čtvrtek?"],
        follow_up: "Kdo by se měl ukázky zúčastnit?",
        tone_hint: Some("konkrétní termín"),
    },
    CardSeed {
        key: "persona-owner",
        category: CardCategory::Persona,
        title: "Majitel / jednatel",
        triggers: &["majitel", "jednatel", "ředitel"],
        primary: "Mluvte o návratnosti a čase: kolik obchodů týdně unikne a kolik hodin tým \
                  tráví administrativou.",
        alternates: &[],
        follow_up: "Jaký máte cíl na obrat letos?",
        tone_hint: Some("business jazyk"),
    },
    CardSeed {
        key: "persona-it",
        category: CardCategory::Persona,
        title: "IT a integrace",
        triggers: &["it oddělení", "správce sítě", "integrace", "rozhraní"],
        primary: "Zdůrazněte integrace přes API, jednotné přihlášení a nulovou instalaci na \
                  stanice.",
        alternates: &[],
        follow_up: "Jaké systémy by se měly propojit jako první?",
        tone_hint: Some("technicky přesně"),
    },
    CardSeed {
        key: "persona-finance",
        category: CardCategory::Persona,
        title: "Finance",
        triggers: &["účetní", "finanční ředitel", "fakturace", "cfo"],
        primary: "Mluvte o předvídatelných nákladech, měsíční fakturaci a úsporách na \
                  administrativě.",
        alternates: &[],
        follow_up: "Jak u vás probíhá schvalování nových nákladů?",
        tone_hint: None,
    },
];

pub(super) const ALIAS_SEEDS: &[AliasSeed] = &[
    AliasSeed { phrase: "kolik to stojí", card_key: "price" },
    AliasSeed { phrase: "ceník", card_key: "price" },
    AliasSeed { phrase: "zpracovatelská smlouva", card_key: "security" },
    AliasSeed { phrase: "zpracování dat", card_key: "security" },
    AliasSeed { phrase: "termín", card_key: "next-step" },
    AliasSeed { phrase: "nemám zájem", card_key: "not-interested" },
];
